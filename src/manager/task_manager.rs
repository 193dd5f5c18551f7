use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};

use crate::models::message::PoolMessage;
use crate::models::progress::{CancelToken, ProgressListener};
use crate::models::task::{Submission, Task, TaskListener, TaskStatus};
use crate::worker::worker::spawn_scheduler_thread;

/// Concurrency cap used by `TaskManager::default`.
pub const DEFAULT_MAX_RUNNING: usize = 2;

/// Observes the pool's own lifecycle. `manager_stopping` fires when
/// the pool leaves its admission loop, `manager_stopped` once the last
/// running task has drained.
pub trait TaskManagerListener: Send {
    fn manager_started(&mut self) {}

    fn manager_stopping(&mut self) {}

    fn manager_stopped(&mut self) {}
}

/// Task plus listeners, moved onto the task thread at admission.
pub(crate) struct RunnableTask {
    pub(crate) task: Box<dyn Task>,
    pub(crate) task_listeners: Vec<Box<dyn TaskListener>>,
    pub(crate) progress_listeners: Vec<Box<dyn ProgressListener>>,
}

pub(crate) struct TaskEntry {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) status: TaskStatus,
    pub(crate) cancel: CancelToken,
    pub(crate) runnable: Option<RunnableTask>,
}

/// Queue and running count share one lock so admission and completion
/// accounting can never race each other.
pub(crate) struct PoolState {
    pub(crate) entries: Vec<TaskEntry>,
    pub(crate) running: usize,
}

/// Point-in-time view of one queued task.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: u64,
    pub name: String,
    pub status: TaskStatus,
}

/// Bounded-concurrency FIFO pool for background tasks.
///
/// Owned by the host application. `queue` accepts work before or after
/// `start`; `stop` drains in-flight tasks without interrupting them.
pub struct TaskManager {
    state: Arc<Mutex<PoolState>>,
    listeners: Arc<Mutex<Vec<Box<dyn TaskManagerListener>>>>,
    sender: Sender<PoolMessage>,
    receiver: Receiver<PoolMessage>,
    max_running: usize,
    next_id: AtomicU64,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl TaskManager {
    pub fn new(max_running: usize) -> Self {
        let max_running = if max_running == 0 {
            warn!("max_running of 0 raised to 1.");
            1
        } else {
            max_running
        };
        let (sender, receiver) = unbounded();
        TaskManager {
            state: Arc::new(Mutex::new(PoolState {
                entries: Vec::new(),
                running: 0,
            })),
            listeners: Arc::new(Mutex::new(Vec::new())),
            sender,
            receiver,
            max_running,
            next_id: AtomicU64::new(0),
            scheduler: Mutex::new(None),
        }
    }

    pub fn max_running(&self) -> usize {
        self.max_running
    }

    pub fn add_listener(&self, listener: impl TaskManagerListener + 'static) {
        self.listeners.lock().unwrap().push(Box::new(listener));
    }

    /// Spawn the scheduler loop on its own thread. Calling `start`
    /// again while a scheduler is attached does nothing.
    pub fn start(&self) {
        let mut scheduler = self.scheduler.lock().unwrap();
        if scheduler.is_some() {
            warn!("Scheduler already started.");
            return;
        }
        *scheduler = Some(spawn_scheduler_thread(
            Arc::clone(&self.state),
            Arc::clone(&self.listeners),
            self.sender.clone(),
            self.receiver.clone(),
            self.max_running,
        ));
    }

    /// Enqueue a task in insertion order and wake the scheduler.
    /// Returns the id used by the status observers.
    pub fn queue(&self, submission: Submission) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let name = submission.task.name().to_string();
        {
            let mut state = self.state.lock().unwrap();
            state.entries.push(TaskEntry {
                id,
                name: name.clone(),
                status: TaskStatus::Waiting,
                cancel: submission.cancel.clone(),
                runnable: Some(RunnableTask {
                    task: submission.task,
                    task_listeners: submission.task_listeners,
                    progress_listeners: submission.progress_listeners,
                }),
            });
        }
        info!("Task '{}' queued with id {}.", name, id);
        let _ = self.sender.send(PoolMessage::TaskQueued);
        id
    }

    pub fn queue_task(&self, task: impl Task) -> u64 {
        self.queue(Submission::new(task))
    }

    /// Request shutdown. Checked between scheduler iterations only;
    /// running tasks are awaited, never interrupted.
    pub fn stop(&self) {
        info!("Task manager stop requested.");
        let _ = self.sender.send(PoolMessage::Stop);
    }

    /// Wait for the scheduler thread to exit. Returns immediately if
    /// `start` was never called.
    pub fn join(&self) {
        let handle = self.scheduler.lock().unwrap().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Scheduler thread panicked.");
            }
        }
    }

    pub fn task_status(&self, id: u64) -> Option<TaskStatus> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.status)
    }

    /// Cancel token of a queued task, usable from any thread.
    pub fn cancel_token(&self, id: u64) -> Option<CancelToken> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.cancel.clone())
    }

    pub fn running_count(&self) -> usize {
        self.state.lock().unwrap().running
    }

    pub fn is_running_task(&self) -> bool {
        0 < self.running_count()
    }

    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(|entry| TaskSnapshot {
                id: entry.id,
                name: entry.name.clone(),
                status: entry.status,
            })
            .collect()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RUNNING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cap_is_two() {
        assert_eq!(TaskManager::default().max_running(), DEFAULT_MAX_RUNNING);
    }

    #[test]
    fn zero_cap_is_raised_to_one() {
        assert_eq!(TaskManager::new(0).max_running(), 1);
    }

    #[test]
    fn ids_are_assigned_in_queue_order() {
        use crate::models::task::{TaskResult, TaskStatus};
        use crate::models::progress::TaskContext;

        struct Noop;
        impl crate::models::task::Task for Noop {
            fn name(&self) -> &str {
                "noop"
            }
            fn execute(&mut self, _ctx: &mut TaskContext) -> TaskResult {
                TaskResult::success()
            }
        }

        let manager = TaskManager::new(1);
        let first = manager.queue_task(Noop);
        let second = manager.queue_task(Noop);
        assert!(first < second);
        assert_eq!(manager.task_status(first), Some(TaskStatus::Waiting));
        assert_eq!(manager.task_status(second), Some(TaskStatus::Waiting));
        assert_eq!(manager.running_count(), 0);
    }
}
