//! Tracks one flashing-tool run from start to exit.

pub mod scanner;
pub mod state;

pub use scanner::{ERROR_PREFIX, OutputScanner, ScanUpdate};
pub use state::{RunState, SessionState};

use std::fmt;

use tracing::{debug, info, warn};

use crate::command::ToolCommand;
use crate::process::{ProcessError, ProcessExit};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    Succeeded { run: RunState },
    Failed {
        run: RunState,
        code: i32,
        /// Last error line, with the `ERROR: ` prefix removed.
        error: Option<String>,
    },
    FailedToStart { run: RunState },
    Crashed { run: RunState },
    Unknown { run: RunState, reason: String },
}

impl TerminalOutcome {
    pub fn run(&self) -> RunState {
        match self {
            TerminalOutcome::Succeeded { run }
            | TerminalOutcome::Failed { run, .. }
            | TerminalOutcome::FailedToStart { run }
            | TerminalOutcome::Crashed { run }
            | TerminalOutcome::Unknown { run, .. } => *run,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TerminalOutcome::Succeeded { .. })
    }
}

impl fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalOutcome::Succeeded {
                run: RunState::Flashing,
            } => write!(f, "Flash completed successfully!"),
            TerminalOutcome::Succeeded {
                run: RunState::DetectingDevice,
            } => write!(f, "Device detected"),
            TerminalOutcome::Succeeded { run } => write!(f, "{} completed", run),
            TerminalOutcome::Failed {
                error: Some(error), ..
            } => write!(f, "{}", error),
            TerminalOutcome::Failed {
                run: RunState::DetectingDevice,
                ..
            } => write!(f, "Device not detected"),
            TerminalOutcome::Failed { code, .. } => {
                write!(f, "Heimdall exited with code {}", code)
            }
            TerminalOutcome::FailedToStart { .. } => write!(f, "Failed to start Heimdall!"),
            TerminalOutcome::Crashed { .. } => write!(f, "Heimdall crashed!"),
            TerminalOutcome::Unknown { .. } => write!(f, "Heimdall reported an unknown error!"),
        }
    }
}

/// State machine for the flashing-tool slot.
///
/// `begin` moves from Idle into a run, `on_output` digests the live output
/// and `finish` classifies the exit and always returns to Idle with
/// progress 0.
#[derive(Debug, Default)]
pub struct ToolSessionMonitor {
    state: SessionState,
    failed: bool,
    resume: bool,
    device_detected: bool,
    status: String,
    progress: u8,
    last_line: String,
    last_error: Option<String>,
    scanner: OutputScanner,
}

impl ToolSessionMonitor {
    pub fn new(resume: bool) -> Self {
        Self {
            resume,
            ..Self::default()
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn run(&self) -> RunState {
        self.state.run
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// The last run could not be started.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Whether the next run should pass `--resume`.
    pub fn resume(&self) -> bool {
        self.resume
    }

    pub fn set_resume(&mut self, resume: bool) {
        self.resume = resume;
    }

    pub fn device_detected(&self) -> bool {
        self.device_detected
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Enter the run described by `command`.
    pub fn begin(&mut self, command: &ToolCommand) -> Result<(), ProcessError> {
        if !self.is_idle() {
            return Err(ProcessError::Busy);
        }
        self.state = SessionState::new(command.run, command.no_reboot);
        self.failed = false;
        self.progress = 0;
        self.status.clear();
        self.last_line.clear();
        self.last_error = None;
        self.scanner.reset();
        if command.run == RunState::DetectingDevice {
            self.device_detected = false;
        }
        debug!(run = %command.run, no_reboot = command.no_reboot, "Run started");
        Ok(())
    }

    pub fn on_output(&mut self, chunk: &[u8]) -> ScanUpdate {
        let update = self.scanner.feed(chunk);
        if let Some(status) = &update.status {
            self.status = status.clone();
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(error) = &update.error {
            self.last_error = Some(error.clone());
        }
        if let Some(line) = update
            .display
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
        {
            self.last_line = line.to_string();
        }
        update
    }

    /// Classify how the run ended and return to Idle.
    pub fn finish(&mut self, exit: &ProcessExit) -> TerminalOutcome {
        let run = self.state.run;
        let outcome = match exit {
            ProcessExit::Exited { code: 0, .. } => {
                self.resume = self.state.no_reboot;
                if run == RunState::DetectingDevice {
                    self.device_detected = true;
                }
                TerminalOutcome::Succeeded { run }
            }
            ProcessExit::Exited { code, stderr } => {
                let error = match run {
                    RunState::Flashing => error_line(stderr)
                        .or_else(|| self.last_error.take().as_deref().and_then(error_line))
                        .or_else(|| error_line(&self.last_line)),
                    RunState::DetectingDevice => {
                        self.device_detected = false;
                        None
                    }
                    _ => None,
                };
                TerminalOutcome::Failed {
                    run,
                    code: *code,
                    error,
                }
            }
            ProcessExit::Error { error, .. } => match error {
                ProcessError::FailedToStart { .. } | ProcessError::Timedout => {
                    self.failed = true;
                    TerminalOutcome::FailedToStart { run }
                }
                ProcessError::Crashed => TerminalOutcome::Crashed { run },
                other => TerminalOutcome::Unknown {
                    run,
                    reason: other.to_string(),
                },
            },
        };

        if outcome.is_success() {
            info!(run = %run, "{}", outcome);
        } else {
            warn!(run = %run, "{}", outcome);
        }

        self.status = outcome.to_string();
        self.state.reset();
        self.progress = 0;
        self.scanner.reset();
        outcome
    }
}

/// Last non-empty line of `text` with every `ERROR: ` removed.
fn error_line(text: &str) -> Option<String> {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.replace(ERROR_PREFIX, ""))
        .filter(|l| !l.is_empty())
}
