//! Device utility (adb) argument vectors and outcome classification.

use std::fmt;
use std::path::PathBuf;

use crate::process::{ProcessError, ProcessExit};

/// Lines fetched by [`AdbCommand::Logcat`] when none are requested.
pub const DEFAULT_LOGCAT_LINES: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdbCommand {
    RebootRecovery,
    RebootDownload,
    RebootFastboot,
    Shutdown,
    /// User-supplied command line, split on whitespace.
    Custom(String),
    Devices,
    ShellLsRoot,
    Logcat { lines: u32 },
    CheckRoot,
    Install(PathBuf),
    GetProp,
}

impl AdbCommand {
    /// A custom command, or `None` if `text` has no words.
    pub fn custom(text: &str) -> Option<Self> {
        let text = text.trim();
        (!text.is_empty()).then(|| AdbCommand::Custom(text.to_string()))
    }

    pub fn args(&self) -> Vec<String> {
        let fixed: &[&str] = match self {
            AdbCommand::RebootRecovery => &["reboot", "recovery"],
            AdbCommand::RebootDownload => &["reboot", "download"],
            AdbCommand::RebootFastboot => &["reboot", "bootloader"],
            AdbCommand::Shutdown => &["shell", "reboot", "-p"],
            AdbCommand::Devices => &["devices", "-l"],
            AdbCommand::ShellLsRoot => &["shell", "ls", "-la", "/"],
            AdbCommand::CheckRoot => &["shell", "which", "su"],
            AdbCommand::GetProp => &["shell", "getprop"],
            AdbCommand::Custom(text) => {
                return text.split_whitespace().map(str::to_string).collect();
            }
            AdbCommand::Logcat { lines } => {
                return vec![
                    "logcat".to_string(),
                    "-d".to_string(),
                    "-t".to_string(),
                    lines.to_string(),
                ];
            }
            AdbCommand::Install(apk) => {
                return vec!["install".to_string(), apk.to_string_lossy().into_owned()];
            }
        };
        fixed.iter().map(|s| s.to_string()).collect()
    }

    /// Trailer printed after a successful run, if any.
    pub fn completion_note(&self) -> Option<&'static str> {
        match self {
            AdbCommand::Devices => Some("--- Device list complete ---"),
            AdbCommand::Install(_) => Some("--- APK installation complete ---"),
            AdbCommand::Logcat { .. } => Some("--- Logcat dump complete ---"),
            _ => None,
        }
    }

    fn is_shell(&self) -> bool {
        self.args().first().is_some_and(|a| a == "shell")
    }
}

impl fmt::Display for AdbCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "adb {}", self.args().join(" "))
    }
}

/// How an adb run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdbOutcome {
    Success,
    Failed { code: i32 },
    Crashed,
    FailedToStart,
    Other(String),
}

impl AdbOutcome {
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            AdbOutcome::Success
        } else {
            AdbOutcome::Failed { code }
        }
    }

    pub fn from_exit(exit: &ProcessExit) -> Self {
        match exit {
            ProcessExit::Exited { code, .. } => Self::from_exit_code(*code),
            ProcessExit::Error {
                error: ProcessError::Crashed,
                ..
            } => AdbOutcome::Crashed,
            ProcessExit::Error { error, .. } if error.is_start_failure() => {
                AdbOutcome::FailedToStart
            }
            ProcessExit::Error { error, .. } => AdbOutcome::Other(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        *self == AdbOutcome::Success
    }

    /// One-line status shown after the run.
    pub fn status(&self) -> String {
        match self {
            AdbOutcome::Success => "ADB Status: Command completed successfully".into(),
            AdbOutcome::Failed { code } => {
                format!("ADB Status: Command failed (exit code: {})", code)
            }
            AdbOutcome::Crashed => "ADB Status: Command crashed".into(),
            AdbOutcome::FailedToStart => {
                "Failed to start ADB. Is ADB installed and in PATH?".into()
            }
            AdbOutcome::Other(reason) => format!("ADB Status: Error ({})", reason),
        }
    }

    /// Troubleshooting hint for a failed `command`.
    pub fn hint(&self, command: &AdbCommand) -> Option<&'static str> {
        match self {
            AdbOutcome::Failed { code: 1 } if command.is_shell() => Some(
                "HINT: Shell command failed. Check device connection or try a different path/command.",
            ),
            AdbOutcome::Failed { code: 1 } => {
                Some("HINT: Command failed. Make sure device is connected and ADB is authorized.")
            }
            AdbOutcome::FailedToStart => Some(
                "Install Android SDK Platform Tools, add ADB to PATH and enable USB debugging on the device.",
            ),
            _ => None,
        }
    }
}

impl fmt::Display for AdbOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_vectors() {
        assert_eq!(AdbCommand::RebootRecovery.args(), vec!["reboot", "recovery"]);
        assert_eq!(AdbCommand::RebootDownload.args(), vec!["reboot", "download"]);
        assert_eq!(AdbCommand::RebootFastboot.args(), vec!["reboot", "bootloader"]);
        assert_eq!(AdbCommand::Shutdown.args(), vec!["shell", "reboot", "-p"]);
        assert_eq!(AdbCommand::Devices.args(), vec!["devices", "-l"]);
        assert_eq!(AdbCommand::ShellLsRoot.args(), vec!["shell", "ls", "-la", "/"]);
        assert_eq!(AdbCommand::CheckRoot.args(), vec!["shell", "which", "su"]);
        assert_eq!(AdbCommand::GetProp.args(), vec!["shell", "getprop"]);
    }

    #[test]
    fn test_parameterised_vectors() {
        assert_eq!(
            AdbCommand::Logcat {
                lines: DEFAULT_LOGCAT_LINES
            }
            .args(),
            vec!["logcat", "-d", "-t", "50"]
        );
        assert_eq!(
            AdbCommand::Install("/tmp/app.apk".into()).args(),
            vec!["install", "/tmp/app.apk"]
        );
        assert_eq!(
            AdbCommand::custom("  shell   getprop ro.product.model ")
                .unwrap()
                .args(),
            vec!["shell", "getprop", "ro.product.model"]
        );
        assert_eq!(AdbCommand::custom("   "), None);
    }

    #[test]
    fn test_outcomes() {
        assert!(AdbOutcome::from_exit_code(0).is_success());
        let failed = AdbOutcome::from_exit_code(1);
        assert_eq!(failed, AdbOutcome::Failed { code: 1 });
        assert_eq!(failed.status(), "ADB Status: Command failed (exit code: 1)");
        assert!(failed.hint(&AdbCommand::ShellLsRoot).unwrap().contains("Shell"));
        assert!(failed.hint(&AdbCommand::Devices).unwrap().contains("authorized"));
        assert_eq!(AdbOutcome::Failed { code: 2 }.hint(&AdbCommand::Devices), None);
        assert_eq!(
            AdbOutcome::from_exit(&ProcessExit::Error {
                error: ProcessError::Timedout,
                stderr: String::new(),
            }),
            AdbOutcome::FailedToStart
        );
        assert_eq!(
            AdbCommand::Devices.completion_note(),
            Some("--- Device list complete ---")
        );
    }
}
