use std::thread;
use std::time::Duration;

use crate::models::progress::TaskContext;
use crate::models::task::{Task, TaskResult};

const STEP: Duration = Duration::from_millis(100);

/// Waits out a configured duration in 100ms steps, reporting elapsed
/// time as progress. Honors cancellation between steps.
pub struct TimerTask {
    duration: Duration,
}

impl TimerTask {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Task for TimerTask {
    fn name(&self) -> &str {
        "timer"
    }

    fn execute(&mut self, ctx: &mut TaskContext) -> TaskResult {
        let mut elapsed = Duration::ZERO;
        while elapsed < self.duration {
            let step = STEP.min(self.duration - elapsed);
            thread::sleep(step);
            elapsed += step;

            let percent = elapsed.as_secs_f64() / self.duration.as_secs_f64() * 100.0;
            let message = format!("{:.2} s elapsed", elapsed.as_secs_f64());
            if !ctx.report_progress(percent.min(100.0), &message) {
                return TaskResult::canceled();
            }
        }
        ctx.report_progress(100.0, "done");
        TaskResult::success()
    }
}
