//! Device utility commands: detect, close-pc-screen, download-pit, print-pit.

use std::path::Path;

use super::{
    ACTION_CLOSE_PC_SCREEN, ACTION_DETECT, ACTION_DOWNLOAD_PIT, ACTION_PRINT_PIT, FLAG_FILE,
    FLAG_OUTPUT, FLAG_STDOUT_ERRORS, ToolCommand, ToolOptions,
};
use crate::monitor::RunState;

/// `detect [--verbose] --stdout-errors`
pub fn detect_command(options: &ToolOptions) -> ToolCommand {
    let mut command = ToolCommand::new(RunState::DetectingDevice, ACTION_DETECT);
    command.verbose_if(options).arg(FLAG_STDOUT_ERRORS);
    command
}

/// `close-pc-screen [--resume] [--verbose] --stdout-errors`
pub fn close_pc_screen_command(options: &ToolOptions) -> ToolCommand {
    let mut command = ToolCommand::new(RunState::ClosingPcScreen, ACTION_CLOSE_PC_SCREEN);
    command
        .resume_if(options)
        .verbose_if(options)
        .arg(FLAG_STDOUT_ERRORS);
    command
}

/// `download-pit --output <path> --no-reboot [--resume] [--verbose] --stdout-errors`
///
/// The device stays in download mode afterwards.
pub fn download_pit_command(output: &Path, options: &ToolOptions) -> ToolCommand {
    let mut command = ToolCommand::new(RunState::DownloadingPit, ACTION_DOWNLOAD_PIT);
    command
        .arg(FLAG_OUTPUT)
        .path_arg(output)
        .no_reboot()
        .resume_if(options)
        .verbose_if(options)
        .arg(FLAG_STDOUT_ERRORS);
    command
}

/// `print-pit [--file <path>] --stdout-errors --no-reboot [--resume] [--verbose]`
///
/// With `file` the tool prints a local PIT instead of reading the device's.
pub fn print_pit_command(file: Option<&Path>, options: &ToolOptions) -> ToolCommand {
    let mut command = ToolCommand::new(RunState::PrintingPit, ACTION_PRINT_PIT);
    if let Some(file) = file {
        command.arg(FLAG_FILE).path_arg(file);
    }
    command
        .arg(FLAG_STDOUT_ERRORS)
        .no_reboot()
        .resume_if(options)
        .verbose_if(options);
    command
}
