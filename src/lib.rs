pub mod manager;
pub mod models;
pub mod tasks;
pub(crate) mod worker;

pub use manager::task_manager::{
    TaskManager, TaskManagerListener, TaskSnapshot, DEFAULT_MAX_RUNNING,
};
pub use models::progress::{CancelToken, ProgressEvent, ProgressListener, TaskContext};
pub use models::task::{Submission, Task, TaskEvent, TaskListener, TaskResult, TaskStatus};
pub use tasks::command::CommandTask;
pub use tasks::timer::TimerTask;
