use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::error;

use crate::models::progress::TaskContext;
use crate::models::task::{Task, TaskResult};

const WAIT_STEP: Duration = Duration::from_millis(100);

/// Runs a shell command and captures its output line by line into a
/// shared buffer the host can read while the task runs. Cancellation
/// kills the child process.
pub struct CommandTask {
    command: String,
    output: Arc<Mutex<Vec<String>>>,
}

impl CommandTask {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the captured output lines, prefixed with
    /// `[stdout]` or `[stderr]`.
    pub fn output(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.output)
    }
}

impl Task for CommandTask {
    fn name(&self) -> &str {
        &self.command
    }

    fn execute(&mut self, ctx: &mut TaskContext) -> TaskResult {
        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to run command: {}", e);
                return TaskResult::error_with_message(format!("failed to spawn: {}", e));
            }
        };

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, "[stdout]", Arc::clone(&self.output)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, "[stderr]", Arc::clone(&self.output)));
        }

        let result = loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        break TaskResult::success();
                    }
                    break TaskResult::error_with_message(format!(
                        "command exited with {}",
                        status
                    ));
                }
                Ok(None) => {
                    if ctx.is_cancel_requested() {
                        let _ = child.kill();
                        let _ = child.wait();
                        break TaskResult::canceled();
                    }
                    thread::sleep(WAIT_STEP);
                }
                Err(e) => {
                    error!("Failed to wait for child process: {}", e);
                    break TaskResult::error_with_message(format!("wait failed: {}", e));
                }
            }
        };

        for reader in readers {
            let _ = reader.join();
        }
        result
    }
}

fn spawn_reader(
    stream: impl std::io::Read + Send + 'static,
    prefix: &'static str,
    output: Arc<Mutex<Vec<String>>>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            match line {
                Ok(line) => output.lock().unwrap().push(format!("{} {}", prefix, line)),
                Err(_) => break,
            }
        }
    })
}
