//! Frontend session: high-level orchestrator for packages, PITs and tool runs.
//!
//! Owns the loaded and working packages, the PIT the working firmware is
//! bound against, the flashing-tool and device-utility process slots, and
//! the monitor for the flashing tool. Model edits are refused while the
//! flashing tool is running.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::command::{
    AdbCommand, AdbOutcome, ToolCommand, build_flash_command, close_pc_screen_command,
    detect_command, download_pit_command, print_pit_command,
};
use crate::config::FrontendConfig;
use crate::events::{ToolEvent, ToolObserver, TracingObserver};
use crate::firmware::{ExtensionMismatch, FirmwareInfo, ValidationError};
use crate::matcher::{MatchError, quick_convert};
use crate::monitor::{TerminalOutcome, ToolSessionMonitor};
use crate::package::{
    PackageData, PackageError, WorkingPackage, build_package, extract_package,
    normalize_package_path,
};
use crate::pit::{FormatError, PitTable, read_pit_file};
use crate::process::{ProcessError, ProcessEvent, ProcessExit, ProcessSlot, SystemProcess, ToolProcess};

/// Longest single wait inside the blocking helpers.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("No firmware package is loaded")]
    NoLoadedPackage,
    #[error("Firmware is missing: {}", .0.join(", "))]
    IncompletePackage(Vec<&'static str>),
}

pub struct FrontendSession<O: ToolObserver> {
    config: FrontendConfig,
    observer: Arc<O>,
    loaded: PackageData,
    working: PackageData,
    pit: PitTable,
    monitor: ToolSessionMonitor,
    heimdall: ProcessSlot,
    adb: ProcessSlot,
    adb_command: Option<AdbCommand>,
    search_path: Option<OsString>,
}

impl FrontendSession<TracingObserver> {
    /// Create a session running real processes, logging through tracing.
    pub fn new(config: FrontendConfig) -> Self {
        Self::with_processes(
            config,
            Arc::new(TracingObserver),
            Box::new(SystemProcess::new()),
            Box::new(SystemProcess::new()),
        )
    }
}

impl<O: ToolObserver + 'static> FrontendSession<O> {
    /// Create a session with a custom observer and process backends.
    pub fn with_processes(
        config: FrontendConfig,
        observer: Arc<O>,
        heimdall: Box<dyn ToolProcess>,
        adb: Box<dyn ToolProcess>,
    ) -> Self {
        Self {
            monitor: ToolSessionMonitor::new(config.resume),
            config,
            observer,
            loaded: PackageData::default(),
            working: PackageData::default(),
            pit: PitTable::default(),
            heimdall: ProcessSlot::new("heimdall", heimdall),
            adb: ProcessSlot::new("adb", adb),
            adb_command: None,
            search_path: std::env::var_os("PATH"),
        }
    }

    /// Override the PATH used for the start fallback.
    pub fn set_search_path(&mut self, path: Option<OsString>) {
        self.search_path = path;
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    pub fn monitor(&self) -> &ToolSessionMonitor {
        &self.monitor
    }

    pub fn set_resume(&mut self, resume: bool) {
        self.monitor.set_resume(resume);
    }

    pub fn loaded_firmware(&self) -> &FirmwareInfo {
        self.loaded.firmware()
    }

    pub fn working_firmware(&self) -> &FirmwareInfo {
        self.working.firmware()
    }

    /// Edit the working firmware's metadata directly.
    pub fn working_firmware_mut(&mut self) -> Result<&mut FirmwareInfo, SessionError> {
        self.ensure_idle()?;
        Ok(self.working.firmware_mut())
    }

    pub fn pit(&self) -> &PitTable {
        &self.pit
    }

    fn emit(&self, event: ToolEvent) {
        self.observer.on_event(&event);
    }

    fn warn_user(&self, message: String) {
        warn!("{}", message);
        self.emit(ToolEvent::Warning { message });
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if !self.monitor.is_idle() || self.heimdall.is_occupied() {
            return Err(ProcessError::Busy.into());
        }
        Ok(())
    }

    // ========================================================================
    // Packages and PIT
    // ========================================================================

    /// Extract a package for inspection. On failure the previously loaded
    /// package is kept.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn load_package(&mut self, path: &Path) -> Result<&FirmwareInfo, SessionError> {
        let package = extract_package(path)?;
        self.loaded = package;
        Ok(self.loaded.firmware())
    }

    /// Move the loaded package into the working slot and read its PIT.
    ///
    /// Returns the members the manifest names but the archive lacks. If the
    /// PIT cannot be read or a binding is not in it, the working firmware
    /// and PIT are cleared.
    pub fn load_for_flash(&mut self) -> Result<Vec<String>, SessionError> {
        self.ensure_idle()?;
        if self.loaded.is_cleared() {
            return Err(SessionError::NoLoadedPackage);
        }

        let WorkingPackage { package, missing } = std::mem::take(&mut self.loaded).into_working();
        self.working = package;
        for member in &missing {
            self.warn_user(format!("{} is not included in the package", member));
        }

        let pit_path = self.working.firmware().pit_filename.clone();
        let result = read_pit_file(&pit_path)
            .map_err(SessionError::from)
            .and_then(|pit| {
                self.working.firmware().validate_against(&pit)?;
                Ok(pit)
            });

        match result {
            Ok(pit) => {
                info!(
                    name = %self.working.firmware().name,
                    partitions = self.working.firmware().files.len(),
                    "Firmware loaded for flashing"
                );
                self.pit = pit;
                Ok(missing)
            }
            Err(e) => {
                self.working.clear();
                self.pit.clear();
                Err(e)
            }
        }
    }

    /// Switch the working firmware to another PIT file.
    ///
    /// Bindings follow their partition by name; those whose partition the
    /// new PIT lacks are dropped and returned. If the new PIT is invalid the
    /// previous one is read back, and if that fails too the working
    /// firmware and PIT are cleared.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn select_pit(&mut self, path: &Path) -> Result<Vec<String>, SessionError> {
        self.ensure_idle()?;

        let new_pit = match read_pit_file(path) {
            Ok(pit) => pit,
            Err(e) => {
                let previous = self.working.firmware().pit_filename.clone();
                match read_pit_file(&previous) {
                    Ok(pit) => self.pit = pit,
                    Err(_) => {
                        self.working.clear();
                        self.pit.clear();
                    }
                }
                return Err(e.into());
            }
        };

        let dropped = self
            .working
            .firmware_mut()
            .remap_partitions(&self.pit, &new_pit);
        for name in &dropped {
            self.warn_user(format!("{} partition does not exist in the new PIT", name));
        }

        self.working.firmware_mut().pit_filename = path.to_path_buf();
        self.pit = new_pit;
        Ok(dropped)
    }

    /// Flashable partition ids not yet bound in the working firmware.
    pub fn unused_partition_ids(&self) -> Vec<u32> {
        self.working.firmware().unused_partition_ids(&self.pit)
    }

    pub fn add_binding(&mut self) -> Result<usize, SessionError> {
        self.ensure_idle()?;
        Ok(self.working.firmware_mut().add_binding(&self.pit)?)
    }

    pub fn remove_binding(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.working.firmware_mut().remove_binding(index)?;
        Ok(())
    }

    pub fn set_binding_partition(
        &mut self,
        index: usize,
        partition_id: u32,
    ) -> Result<Option<ExtensionMismatch>, SessionError> {
        self.ensure_idle()?;
        let mismatch = self
            .working
            .firmware_mut()
            .set_binding_partition(index, partition_id, &self.pit)?;
        self.report_mismatch(mismatch.as_ref());
        Ok(mismatch)
    }

    pub fn set_binding_file(
        &mut self,
        index: usize,
        path: impl Into<PathBuf>,
    ) -> Result<Option<ExtensionMismatch>, SessionError> {
        self.ensure_idle()?;
        let mismatch = self
            .working
            .firmware_mut()
            .set_binding_file(index, path, &self.pit)?;
        self.report_mismatch(mismatch.as_ref());
        Ok(mismatch)
    }

    fn report_mismatch(&self, mismatch: Option<&ExtensionMismatch>) {
        if let Some(mismatch) = mismatch {
            self.warn_user(mismatch.to_string());
        }
    }

    /// Write the working firmware to a package. Returns the normalized
    /// destination.
    pub fn build_package(&self, destination: &Path) -> Result<PathBuf, SessionError> {
        let firmware = self.working.firmware();
        let missing = firmware.missing_package_fields();
        if !missing.is_empty() {
            return Err(SessionError::IncompletePackage(missing));
        }
        firmware.check_ready_to_flash(&self.pit)?;

        let destination = normalize_package_path(destination);
        build_package(&destination, firmware)?;
        Ok(destination)
    }

    /// Map loose images onto `pit_path` and write the result as a package.
    pub fn quick_convert<P: AsRef<Path>>(
        &self,
        pit_path: &Path,
        files: &[P],
        destination: &Path,
    ) -> Result<PathBuf, SessionError> {
        let firmware = quick_convert(pit_path, files)?;
        let destination = normalize_package_path(destination);
        build_package(&destination, &firmware)?;
        Ok(destination)
    }

    // ========================================================================
    // Flashing tool
    // ========================================================================

    pub fn start_flash(&mut self) -> Result<PathBuf, SessionError> {
        self.ensure_idle()?;
        let options = self.config.tool_options(self.monitor.resume());
        let flash = build_flash_command(self.working.firmware(), &self.pit, &options)?;
        if flash.repartition_skipped {
            self.emit(ToolEvent::Warning {
                message: "Skipping repartition (single partition flash)".into(),
            });
        }
        self.run_tool(flash.command)
    }

    pub fn detect_device(&mut self) -> Result<PathBuf, SessionError> {
        let command = detect_command(&self.config.tool_options(self.monitor.resume()));
        self.run_tool(command)
    }

    pub fn close_pc_screen(&mut self) -> Result<PathBuf, SessionError> {
        let command = close_pc_screen_command(&self.config.tool_options(self.monitor.resume()));
        self.run_tool(command)
    }

    pub fn download_pit(&mut self, output: &Path) -> Result<PathBuf, SessionError> {
        let command =
            download_pit_command(output, &self.config.tool_options(self.monitor.resume()));
        self.run_tool(command)
    }

    /// Print the device's PIT, or a local PIT file through the tool.
    pub fn print_pit(&mut self, file: Option<&Path>) -> Result<PathBuf, SessionError> {
        let command = print_pit_command(file, &self.config.tool_options(self.monitor.resume()));
        self.run_tool(command)
    }

    #[instrument(skip(self, command), fields(run = %command.run))]
    fn run_tool(&mut self, command: ToolCommand) -> Result<PathBuf, SessionError> {
        if self.heimdall.is_occupied() {
            return Err(ProcessError::Busy.into());
        }
        self.monitor.begin(&command)?;

        let policy = self.config.launch_policy();
        let launched = self.heimdall.launch(
            &self.config.heimdall_program,
            &command.args,
            self.search_path.as_deref(),
            &policy,
        );
        match launched {
            Ok(program) => {
                self.emit(ToolEvent::Started {
                    run: command.run,
                    program: program.clone(),
                    args: command.args,
                });
                Ok(program)
            }
            Err(error) => {
                let outcome = self.monitor.finish(&ProcessExit::Error {
                    error: error.clone(),
                    stderr: String::new(),
                });
                self.emit(ToolEvent::Finished { outcome });
                Err(error.into())
            }
        }
    }

    fn handle_tool_event(&mut self, event: ProcessEvent) -> Option<TerminalOutcome> {
        match event {
            ProcessEvent::Output(bytes) => {
                let update = self.monitor.on_output(&bytes);
                if !update.display.is_empty() {
                    self.emit(ToolEvent::Output {
                        text: update.display,
                    });
                }
                if let Some(text) = update.status {
                    self.emit(ToolEvent::Status { text });
                }
                if let Some(percent) = update.progress {
                    self.emit(ToolEvent::Progress { percent });
                }
                None
            }
            ProcessEvent::Finished(exit) => {
                let outcome = self.monitor.finish(&exit);
                self.emit(ToolEvent::Finished {
                    outcome: outcome.clone(),
                });
                Some(outcome)
            }
        }
    }

    /// Handle every pending flashing-tool event without blocking.
    /// Returns the outcome if the run ended.
    pub fn poll_tool(&mut self) -> Option<TerminalOutcome> {
        while let Some(event) = self.heimdall.try_event() {
            if let Some(outcome) = self.handle_tool_event(event) {
                return Some(outcome);
            }
        }
        None
    }

    /// Handle flashing-tool events until the run ends or `timeout` passes.
    pub fn wait_tool(&mut self, timeout: Duration) -> Option<TerminalOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            match self.heimdall.wait_event((deadline - now).min(POLL_INTERVAL)) {
                Some(event) => {
                    if let Some(outcome) = self.handle_tool_event(event) {
                        return Some(outcome);
                    }
                }
                None if !self.heimdall.is_occupied() => return None,
                None => {}
            }
        }
    }

    // ========================================================================
    // Device utility
    // ========================================================================

    pub fn run_adb(&mut self, command: AdbCommand) -> Result<PathBuf, SessionError> {
        if self.adb.is_occupied() {
            return Err(ProcessError::Busy.into());
        }

        let policy = self.config.launch_policy();
        let args = command.args();
        let launched = self.adb.launch(
            &self.config.adb_program,
            &args,
            self.search_path.as_deref(),
            &policy,
        );
        match launched {
            Ok(program) => {
                self.emit(ToolEvent::AdbOutput {
                    text: format!("Executing: {}\n", command),
                });
                self.adb_command = Some(command);
                Ok(program)
            }
            Err(error) => {
                let outcome = AdbOutcome::from_exit(&ProcessExit::Error {
                    error: error.clone(),
                    stderr: String::new(),
                });
                self.emit(ToolEvent::AdbFinished { command, outcome });
                Err(error.into())
            }
        }
    }

    pub fn adb_running(&self) -> bool {
        self.adb.is_occupied()
    }

    fn handle_adb_event(&mut self, event: ProcessEvent) -> Option<AdbOutcome> {
        match event {
            ProcessEvent::Output(bytes) => {
                self.emit(ToolEvent::AdbOutput {
                    text: String::from_utf8_lossy(&bytes).into_owned(),
                });
                None
            }
            ProcessEvent::Finished(exit) => {
                let outcome = AdbOutcome::from_exit(&exit);
                if let Some(command) = self.adb_command.take() {
                    self.emit(ToolEvent::AdbFinished {
                        command,
                        outcome: outcome.clone(),
                    });
                }
                Some(outcome)
            }
        }
    }

    pub fn poll_adb(&mut self) -> Option<AdbOutcome> {
        while let Some(event) = self.adb.try_event() {
            if let Some(outcome) = self.handle_adb_event(event) {
                return Some(outcome);
            }
        }
        None
    }

    pub fn wait_adb(&mut self, timeout: Duration) -> Option<AdbOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            match self.adb.wait_event((deadline - now).min(POLL_INTERVAL)) {
                Some(event) => {
                    if let Some(outcome) = self.handle_adb_event(event) {
                        return Some(outcome);
                    }
                }
                None if !self.adb.is_occupied() => return None,
                None => {}
            }
        }
    }
}
