use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info};

use crate::manager::task_manager::{PoolState, RunnableTask, TaskManagerListener};
use crate::models::message::PoolMessage;
use crate::models::progress::{CancelToken, TaskContext};
use crate::models::task::{TaskEvent, TaskResult, TaskStatus};

/// Scheduler loop: block on the channel, admit waiting tasks into free
/// slots on every wake-up, and on a stop request drain the running
/// tasks before the stopped notification.
pub(crate) fn spawn_scheduler_thread(
    state: Arc<Mutex<PoolState>>,
    listeners: Arc<Mutex<Vec<Box<dyn TaskManagerListener>>>>,
    sender: Sender<PoolMessage>,
    receiver: Receiver<PoolMessage>,
    max_running: usize,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for listener in listeners.lock().unwrap().iter_mut() {
            listener.manager_started();
        }
        info!("Task manager started.");

        loop {
            admit_waiting(&state, &sender, max_running);

            match receiver.recv() {
                Ok(PoolMessage::Stop) => break,
                Ok(PoolMessage::TaskQueued) => {}
                Ok(PoolMessage::TaskFinished(id)) => {
                    debug!("Slot freed by task {}.", id);
                }
                Err(_) => {
                    // all senders gone, treat as a stop request
                    debug!("Scheduler channel disconnected.");
                    break;
                }
            }
        }

        for listener in listeners.lock().unwrap().iter_mut() {
            listener.manager_stopping();
        }
        info!("Task manager stopping.");

        drain_running(&state, &receiver);

        for listener in listeners.lock().unwrap().iter_mut() {
            listener.manager_stopped();
        }
        info!("Task manager stopped.");
    })
}

/// Start the first waiting task in insertion order until the cap is
/// filled or nothing is waiting.
fn admit_waiting(state: &Arc<Mutex<PoolState>>, sender: &Sender<PoolMessage>, max_running: usize) {
    loop {
        let admitted = {
            let mut state_guard = state.lock().unwrap();
            if state_guard.running >= max_running {
                return;
            }
            let entry = state_guard
                .entries
                .iter_mut()
                .find(|entry| entry.status == TaskStatus::Waiting);
            match entry {
                Some(entry) => {
                    entry.status = TaskStatus::Starting;
                    let runnable = match entry.runnable.take() {
                        Some(runnable) => runnable,
                        None => {
                            entry.status = TaskStatus::Finished;
                            continue;
                        }
                    };
                    let id = entry.id;
                    let cancel = entry.cancel.clone();
                    state_guard.running += 1;
                    (id, cancel, runnable)
                }
                None => return,
            }
        };
        let (id, cancel, runnable) = admitted;
        spawn_task_thread(Arc::clone(state), sender.clone(), id, cancel, runnable);
    }
}

/// Wait until the running count reaches zero. Completion messages wake
/// the loop; stale queue messages are ignored.
fn drain_running(state: &Arc<Mutex<PoolState>>, receiver: &Receiver<PoolMessage>) {
    loop {
        if state.lock().unwrap().running == 0 {
            return;
        }
        if receiver.recv().is_err() {
            return;
        }
    }
}

fn spawn_task_thread(
    state: Arc<Mutex<PoolState>>,
    sender: Sender<PoolMessage>,
    id: u64,
    cancel: CancelToken,
    runnable: RunnableTask,
) {
    thread::spawn(move || {
        set_status(&state, id, TaskStatus::Running);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_task(cancel, runnable)));
        let terminal = match outcome {
            Ok(canceled) => {
                if canceled {
                    TaskStatus::Canceled
                } else {
                    TaskStatus::Finished
                }
            }
            Err(_) => {
                // a listener or destroy hook panicked past the body
                // guard; keep the slot accounting intact
                error!("Task thread for id {} panicked.", id);
                TaskStatus::Finished
            }
        };

        {
            let mut state_guard = state.lock().unwrap();
            if let Some(entry) = state_guard.entries.iter_mut().find(|entry| entry.id == id) {
                entry.status = terminal;
            }
            state_guard.running -= 1;
        }
        let _ = sender.send(PoolMessage::TaskFinished(id));
    });
}

/// Full task lifecycle on the task's own thread: initialize, execute,
/// listener fan-out, destroy. A panic in the body is logged and
/// reported as a failure; it never reaches the scheduler. Returns
/// whether the task ended canceled.
fn run_task(cancel: CancelToken, runnable: RunnableTask) -> bool {
    let RunnableTask {
        mut task,
        mut task_listeners,
        progress_listeners,
    } = runnable;
    let name = task.name().to_string();
    let mut ctx = TaskContext::new(name.clone(), cancel, progress_listeners);

    info!("Task '{}' started.", name);
    let started = TaskEvent::started(name.clone());
    for listener in task_listeners.iter_mut() {
        listener.task_started(&started);
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        task.initialize();
        task.execute(&mut ctx)
    }));
    let result = match outcome {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Task '{}' panicked: {}", name, message);
            TaskResult::error_with_message(message)
        }
    };

    let event = TaskEvent::finished(name.clone(), result.clone());
    if result.is_success() {
        if result.is_canceled() {
            info!("Task '{}' canceled.", name);
            for listener in task_listeners.iter_mut() {
                listener.task_canceled(&event);
            }
        } else {
            info!("Task '{}' finished.", name);
            for listener in task_listeners.iter_mut() {
                listener.task_succeeded(&event);
            }
        }
    } else {
        error!(
            "Task '{}' failed: {}",
            name,
            result.message().unwrap_or("no message")
        );
        for listener in task_listeners.iter_mut() {
            listener.task_failed(&event);
        }
    }
    for listener in task_listeners.iter_mut() {
        listener.task_completed(&event);
    }

    task.destroy();

    result.is_canceled()
}

fn set_status(state: &Arc<Mutex<PoolState>>, id: u64, status: TaskStatus) {
    if let Some(entry) = state
        .lock()
        .unwrap()
        .entries
        .iter_mut()
        .find(|entry| entry.id == id)
    {
        entry.status = status;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
