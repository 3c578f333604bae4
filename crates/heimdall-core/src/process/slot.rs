//! Single-occupancy process handle.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::launcher::{LaunchPolicy, launch};
use super::traits::{ProcessError, ProcessEvent, ToolProcess};

/// One process at a time. Starting while occupied is refused with
/// [`ProcessError::Busy`].
pub struct ProcessSlot {
    name: &'static str,
    process: Box<dyn ToolProcess>,
}

impl ProcessSlot {
    pub fn new(name: &'static str, process: Box<dyn ToolProcess>) -> Self {
        Self { name, process }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_occupied(&self) -> bool {
        self.process.is_running()
    }

    /// Start with the PATH fallback. See [`launch`].
    pub fn launch(
        &mut self,
        program: &Path,
        args: &[String],
        path_var: Option<&OsStr>,
        policy: &LaunchPolicy,
    ) -> Result<PathBuf, ProcessError> {
        if self.is_occupied() {
            return Err(ProcessError::Busy);
        }
        launch(self.process.as_mut(), program, args, path_var, policy)
    }

    pub fn try_event(&mut self) -> Option<ProcessEvent> {
        self.process.try_event()
    }

    pub fn wait_event(&mut self, timeout: Duration) -> Option<ProcessEvent> {
        self.process.wait_event(timeout)
    }

    pub fn kill(&mut self) -> Result<(), ProcessError> {
        self.process.kill()
    }
}
