//! Event system for UI decoupling.
//!
//! Allows a CLI or GUI to follow tool runs and package operations without
//! tight coupling to the session.

use std::path::PathBuf;

use crate::command::{AdbCommand, AdbOutcome};
use crate::monitor::{RunState, TerminalOutcome};

/// Events emitted by the frontend session.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    /// A tool process started.
    Started {
        run: RunState,
        program: PathBuf,
        args: Vec<String>,
    },
    /// Output to display, already cleaned of control characters.
    Output { text: String },
    /// New upload status line.
    Status { text: String },
    /// Progress percentage of the current upload.
    Progress { percent: u8 },
    /// A flashing-tool run ended.
    Finished { outcome: TerminalOutcome },
    /// Output from the device utility.
    AdbOutput { text: String },
    /// A device utility run ended.
    AdbFinished {
        command: AdbCommand,
        outcome: AdbOutcome,
    },
    /// Recoverable problem worth showing to the user.
    Warning { message: String },
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait ToolObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &ToolEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl ToolObserver for NullObserver {
    fn on_event(&self, _event: &ToolEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl ToolObserver for TracingObserver {
    fn on_event(&self, event: &ToolEvent) {
        match event {
            ToolEvent::Started { run, program, args } => {
                tracing::info!(run = %run, "Executing: {} {}", program.display(), args.join(" "));
            }
            ToolEvent::Output { text } => {
                tracing::debug!("{}", text.trim_end());
            }
            ToolEvent::Status { text } => {
                tracing::info!("{}", text);
            }
            ToolEvent::Progress { percent } => {
                tracing::debug!(progress = %format!("{}%", percent), "Progress");
            }
            ToolEvent::Finished { outcome } => {
                if outcome.is_success() {
                    tracing::info!(run = %outcome.run(), "{}", outcome);
                } else {
                    tracing::error!(run = %outcome.run(), "{}", outcome);
                }
            }
            ToolEvent::AdbOutput { text } => {
                tracing::debug!("{}", text.trim_end());
            }
            ToolEvent::AdbFinished { command, outcome } => {
                if outcome.is_success() {
                    tracing::info!(command = %command, "{}", outcome);
                } else {
                    tracing::warn!(command = %command, "{}", outcome);
                }
            }
            ToolEvent::Warning { message } => {
                tracing::warn!("{}", message);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Mutex, PoisonError};

    use super::{ToolEvent, ToolObserver};

    /// Observer that records every event.
    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<ToolEvent>>,
    }

    impl RecordingObserver {
        pub fn events(&self) -> Vec<ToolEvent> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl ToolObserver for RecordingObserver {
        fn on_event(&self, event: &ToolEvent) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.clone());
        }
    }
}
