//! Argument vectors for the flashing tool and the device utility tool.
//!
//! Builders only produce arguments; starting the process is the session's
//! job. Argument order is part of the contract and is covered by tests.

pub mod adb;
pub mod flash;
pub mod utility;

pub use adb::{AdbCommand, AdbOutcome};
pub use flash::{FlashCommand, build_flash_command};
pub use utility::{close_pc_screen_command, detect_command, download_pit_command, print_pit_command};

use std::fmt;
use std::path::Path;

use crate::monitor::RunState;

// ============================================================================
// Flashing tool flags
// ============================================================================

pub const ACTION_FLASH: &str = "flash";
pub const ACTION_DETECT: &str = "detect";
pub const ACTION_CLOSE_PC_SCREEN: &str = "close-pc-screen";
pub const ACTION_DOWNLOAD_PIT: &str = "download-pit";
pub const ACTION_PRINT_PIT: &str = "print-pit";

pub const FLAG_REPARTITION: &str = "--repartition";
pub const FLAG_PIT: &str = "--PIT";
pub const FLAG_NO_REBOOT: &str = "--no-reboot";
pub const FLAG_RESUME: &str = "--resume";
pub const FLAG_VERBOSE: &str = "--verbose";
/// Mirror the tool's error channel to stdout so one stream carries everything.
pub const FLAG_STDOUT_ERRORS: &str = "--stdout-errors";
pub const FLAG_OUTPUT: &str = "--output";
pub const FLAG_FILE: &str = "--file";

/// Session-wide switches applied to every flashing-tool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolOptions {
    /// Reconnect to a device left in download mode by a no-reboot run.
    pub resume: bool,
    pub verbose: bool,
}

/// A ready-to-run flashing-tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Run kind the monitor enters while this command executes.
    pub run: RunState,
    pub args: Vec<String>,
    /// The command leaves the device in download mode.
    pub no_reboot: bool,
}

impl ToolCommand {
    fn new(run: RunState, action: &str) -> Self {
        Self {
            run,
            args: vec![action.to_string()],
            no_reboot: false,
        }
    }

    fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    fn path_arg(&mut self, path: &Path) -> &mut Self {
        self.arg(path.to_string_lossy())
    }

    fn no_reboot(&mut self) -> &mut Self {
        self.no_reboot = true;
        self.arg(FLAG_NO_REBOOT)
    }

    fn resume_if(&mut self, options: &ToolOptions) -> &mut Self {
        if options.resume {
            self.arg(FLAG_RESUME);
        }
        self
    }

    fn verbose_if(&mut self, options: &ToolOptions) -> &mut Self {
        if options.verbose {
            self.arg(FLAG_VERBOSE);
        }
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}
