use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag for one task.
///
/// Clones observe the same flag. Cancellation is advisory: the task
/// body decides where to check it and how to wind down.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Progress snapshot fanned out to listeners. One instance per task,
/// reused across callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    task_name: String,
    percent: f64,
    message: String,
    detail: String,
}

impl ProgressEvent {
    fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            percent: 0.0,
            message: String::new(),
            detail: String::new(),
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Percent complete, 0.0 to 100.0.
    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Receives progress reports on the reporting task's thread.
pub trait ProgressListener: Send {
    fn progress(&mut self, event: &ProgressEvent);
}

/// Handed to the task body for the duration of `execute`. Bundles the
/// cancel token with the progress listener list.
pub struct TaskContext {
    cancel: CancelToken,
    listeners: Vec<Box<dyn ProgressListener>>,
    event: ProgressEvent,
}

impl TaskContext {
    pub fn new(
        task_name: impl Into<String>,
        cancel: CancelToken,
        listeners: Vec<Box<dyn ProgressListener>>,
    ) -> Self {
        let event = ProgressEvent::new(task_name);
        Self {
            cancel,
            listeners,
            event,
        }
    }

    /// Report progress to all listeners. Returns `false` once
    /// cancellation has been requested; the task body should stop its
    /// loop and return a canceled result.
    ///
    /// The detail field keeps its previous value.
    pub fn report_progress(&mut self, percent: f64, message: &str) -> bool {
        self.event.percent = percent;
        self.event.message.clear();
        self.event.message.push_str(message);
        self.fan_out()
    }

    pub fn report_progress_with_detail(
        &mut self,
        percent: f64,
        message: &str,
        detail: &str,
    ) -> bool {
        self.event.detail.clear();
        self.event.detail.push_str(detail);
        self.report_progress(percent, message)
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_canceled()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn fan_out(&mut self) -> bool {
        for listener in self.listeners.iter_mut() {
            listener.progress(&self.event);
            if self.cancel.is_canceled() {
                return false;
            }
        }
        !self.cancel.is_canceled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    struct Recorder {
        seen: Arc<Mutex<Vec<(f64, String)>>>,
    }

    impl ProgressListener for Recorder {
        fn progress(&mut self, event: &ProgressEvent) {
            self.seen
                .lock()
                .unwrap()
                .push((event.percent(), event.message().to_string()));
        }
    }

    struct CancelOnFirstCall {
        token: CancelToken,
    }

    impl ProgressListener for CancelOnFirstCall {
        fn progress(&mut self, _event: &ProgressEvent) {
            self.token.cancel();
        }
    }

    #[test]
    fn report_returns_true_while_not_canceled() {
        let token = CancelToken::new();
        let mut ctx = TaskContext::new("t", token, vec![]);
        assert!(ctx.report_progress(10.0, "working"));
        assert!(ctx.report_progress(20.0, "working"));
    }

    #[test]
    fn cancel_from_listener_is_observed_on_the_same_report() {
        let token = CancelToken::new();
        let listener = CancelOnFirstCall {
            token: token.clone(),
        };
        let mut ctx = TaskContext::new("t", token, vec![Box::new(listener)]);
        assert!(!ctx.report_progress(10.0, "first"));
        assert!(!ctx.report_progress(20.0, "second"));
    }

    #[test]
    fn detail_is_sticky_across_plain_reports() {
        let token = CancelToken::new();
        let mut ctx = TaskContext::new("t", token, vec![]);
        ctx.report_progress_with_detail(10.0, "step", "file 1 of 3");
        ctx.report_progress(20.0, "step");
        assert_eq!(ctx.event.detail(), "file 1 of 3");
        assert_eq!(ctx.event.percent(), 20.0);
    }

    #[test]
    fn listeners_see_updated_fields() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let token = CancelToken::new();
        let mut ctx = TaskContext::new(
            "t",
            token,
            vec![Box::new(Recorder { seen: seen.clone() })],
        );
        ctx.report_progress(50.0, "halfway");
        ctx.report_progress(100.0, "done");
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![(50.0, "halfway".to_string()), (100.0, "done".to_string())]
        );
    }

    #[test]
    fn external_cancel_flips_is_cancel_requested() {
        let token = CancelToken::new();
        let external = token.clone();
        let ctx = TaskContext::new("t", token, vec![]);
        assert!(!ctx.is_cancel_requested());
        external.cancel();
        assert!(ctx.is_cancel_requested());
    }
}
