use crate::models::progress::{CancelToken, ProgressListener, TaskContext};

/// A unit of background work handed to the pool.
///
/// `initialize` runs before `execute` and `destroy` runs after it
/// regardless of outcome, all on the worker thread that picked the
/// task up.
pub trait Task: Send + 'static {
    fn name(&self) -> &str;

    fn initialize(&mut self) {}

    fn execute(&mut self, ctx: &mut TaskContext) -> TaskResult;

    fn destroy(&mut self) {}
}

/// Outcome of a task body: success, canceled or error.
///
/// Cancellation is modeled as a non-error outcome, so a canceled
/// result always reports success as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    success: bool,
    canceled: bool,
    message: Option<String>,
    detail: Option<String>,
}

impl TaskResult {
    pub fn success() -> Self {
        Self {
            success: true,
            canceled: false,
            message: None,
            detail: None,
        }
    }

    pub fn canceled() -> Self {
        Self {
            success: true,
            canceled: true,
            message: None,
            detail: None,
        }
    }

    pub fn error() -> Self {
        Self {
            success: false,
            canceled: false,
            message: None,
            detail: None,
        }
    }

    pub fn error_with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::error()
        }
    }

    pub fn error_with_detail(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            detail: Some(detail.into()),
            ..Self::error()
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

/// Pool-side status of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Waiting,
    Starting,
    Running,
    Canceled,
    Finished,
}

/// Payload passed to lifecycle listener callbacks. Terminal callbacks
/// carry the task result, `task_started` does not.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    task_name: String,
    result: Option<TaskResult>,
}

impl TaskEvent {
    pub(crate) fn started(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            result: None,
        }
    }

    pub(crate) fn finished(task_name: impl Into<String>, result: TaskResult) -> Self {
        Self {
            task_name: task_name.into(),
            result: Some(result),
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }
}

/// Observes the lifecycle of a single task.
///
/// `task_started` fires first, then exactly one of `task_succeeded`,
/// `task_canceled` or `task_failed`, and `task_completed` always fires
/// last. All callbacks run on the task's own thread.
pub trait TaskListener: Send {
    fn task_started(&mut self, _event: &TaskEvent) {}

    fn task_succeeded(&mut self, _event: &TaskEvent) {}

    fn task_canceled(&mut self, _event: &TaskEvent) {}

    fn task_failed(&mut self, _event: &TaskEvent) {}

    fn task_completed(&mut self, _event: &TaskEvent) {}
}

/// A task bundled with its listeners and cancel token, ready to queue.
pub struct Submission {
    pub(crate) task: Box<dyn Task>,
    pub(crate) task_listeners: Vec<Box<dyn TaskListener>>,
    pub(crate) progress_listeners: Vec<Box<dyn ProgressListener>>,
    pub(crate) cancel: CancelToken,
}

impl Submission {
    pub fn new(task: impl Task) -> Self {
        Self {
            task: Box::new(task),
            task_listeners: Vec::new(),
            progress_listeners: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn add_task_listener(&mut self, listener: impl TaskListener + 'static) {
        self.task_listeners.push(Box::new(listener));
    }

    pub fn add_progress_listener(&mut self, listener: impl ProgressListener + 'static) {
        self.progress_listeners.push(Box::new(listener));
    }

    /// Token shared with the task body. Cancel it to request a
    /// cooperative stop at the task's next checkpoint.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_result_counts_as_success() {
        let result = TaskResult::canceled();
        assert!(result.is_success());
        assert!(result.is_canceled());
    }

    #[test]
    fn success_result_is_not_canceled() {
        let result = TaskResult::success();
        assert!(result.is_success());
        assert!(!result.is_canceled());
        assert_eq!(result.message(), None);
        assert_eq!(result.detail(), None);
    }

    #[test]
    fn error_results_carry_message_and_detail() {
        let result = TaskResult::error();
        assert!(!result.is_success());
        assert!(!result.is_canceled());

        let result = TaskResult::error_with_message("boom");
        assert_eq!(result.message(), Some("boom"));
        assert_eq!(result.detail(), None);

        let result = TaskResult::error_with_detail("boom", "stack");
        assert_eq!(result.message(), Some("boom"));
        assert_eq!(result.detail(), Some("stack"));
    }
}
