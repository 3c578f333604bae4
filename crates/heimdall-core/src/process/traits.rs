//! External process abstraction.
//!
//! Defines the `ToolProcess` trait used to run the flashing tool and the
//! device utility, so the session can be driven by a real child process or
//! a scripted mock.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Failed to start {program}: {reason}")]
    FailedToStart { program: String, reason: String },

    #[error("Process crashed")]
    Crashed,

    #[error("Timed out waiting for the process to start")]
    Timedout,

    #[error("Another process is already running")]
    Busy,

    #[error("Process error: {0}")]
    Unknown(String),
}

impl ProcessError {
    /// Errors that warrant retrying from another directory.
    pub fn is_start_failure(&self) -> bool {
        matches!(
            self,
            ProcessError::FailedToStart { .. } | ProcessError::Timedout
        )
    }
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    /// Normal exit with a status code.
    Exited { code: i32, stderr: String },
    /// Abnormal end (crash, start failure, OS error).
    Error { error: ProcessError, stderr: String },
}

impl ProcessExit {
    pub fn stderr(&self) -> &str {
        match self {
            ProcessExit::Exited { stderr, .. } | ProcessExit::Error { stderr, .. } => stderr,
        }
    }
}

/// Notification from a running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk of standard output, split wherever the OS split it.
    Output(Vec<u8>),
    /// The process is gone. Always the last event of a run.
    Finished(ProcessExit),
}

/// A single external process slot.
pub trait ToolProcess: Send {
    /// Start `program` with `args`.
    ///
    /// Returns once the process is confirmed running or has failed to start.
    /// `start_timeout` bounds how long confirmation may take.
    fn start(
        &mut self,
        program: &Path,
        args: &[String],
        start_timeout: Duration,
    ) -> Result<(), ProcessError>;

    /// A started process has not yet delivered its `Finished` event.
    fn is_running(&self) -> bool;

    /// Next pending event, without blocking.
    fn try_event(&mut self) -> Option<ProcessEvent>;

    /// Next event, waiting up to `timeout`.
    fn wait_event(&mut self, timeout: Duration) -> Option<ProcessEvent>;

    /// Kill the running process. Its `Finished` event is still delivered.
    fn kill(&mut self) -> Result<(), ProcessError>;
}
