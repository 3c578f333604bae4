//! Frontend configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::command::ToolOptions;
use crate::command::adb::DEFAULT_LOGCAT_LINES;
use crate::process::LaunchPolicy;

/// Configuration for a frontend session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Flashing tool executable.
    pub heimdall_program: PathBuf,
    /// Device utility executable.
    pub adb_program: PathBuf,
    /// Pass `--verbose` to the flashing tool.
    pub verbose: bool,
    /// Initial resume default; later seeded by no-reboot runs.
    pub resume: bool,
    /// Wait for each start attempt, in milliseconds.
    pub start_timeout_ms: u64,
    /// Bound on the whole PATH fallback search, in milliseconds.
    pub launch_deadline_ms: u64,
    /// Lines fetched by logcat.
    pub logcat_lines: u32,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            heimdall_program: PathBuf::from("heimdall"),
            adb_program: PathBuf::from("adb"),
            verbose: false,
            resume: false,
            start_timeout_ms: 3000,
            launch_deadline_ms: 15000,
            logcat_lines: DEFAULT_LOGCAT_LINES,
        }
    }
}

impl FrontendConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FrontendConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn launch_policy(&self) -> LaunchPolicy {
        LaunchPolicy {
            start_timeout: Duration::from_millis(self.start_timeout_ms),
            deadline: Duration::from_millis(self.launch_deadline_ms),
        }
    }

    pub fn tool_options(&self, resume: bool) -> ToolOptions {
        ToolOptions {
            resume,
            verbose: self.verbose,
        }
    }
}
