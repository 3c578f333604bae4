//! `flash` command construction.

use tracing::warn;

use super::{FLAG_PIT, FLAG_REPARTITION, FLAG_STDOUT_ERRORS, ToolCommand, ToolOptions};
use crate::firmware::{FirmwareInfo, ValidationError};
use crate::monitor::RunState;
use crate::pit::PitTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashCommand {
    pub command: ToolCommand,
    /// Repartition was requested but dropped because only one partition is
    /// bound.
    pub repartition_skipped: bool,
}

/// Build the `flash` invocation for `firmware`.
///
/// The firmware must be ready to flash against `pit`: at least one binding,
/// a PIT file, a file on every binding and every partition present in the
/// table. Arguments are emitted in this order:
///
/// 1. `flash`
/// 2. `--repartition` (only with more than one binding)
/// 3. `--PIT <pit file>`
/// 4. `--<PARTITION NAME> <file>` per binding, or `--<id> <file>` when the
///    partition is not flashable
/// 5. `--no-reboot`
/// 6. `--resume`
/// 7. `--verbose`
/// 8. `--stdout-errors`
pub fn build_flash_command(
    firmware: &FirmwareInfo,
    pit: &PitTable,
    options: &ToolOptions,
) -> Result<FlashCommand, ValidationError> {
    firmware.check_ready_to_flash(pit)?;

    let mut command = ToolCommand::new(RunState::Flashing, super::ACTION_FLASH);

    let single_partition = firmware.files.len() == 1;
    let repartition_skipped = firmware.repartition && single_partition;
    if firmware.repartition && !single_partition {
        command.arg(FLAG_REPARTITION);
    } else if repartition_skipped {
        warn!("Skipping repartition (single partition flash)");
    }

    command.arg(FLAG_PIT).path_arg(&firmware.pit_filename);

    for file in &firmware.files {
        let flag = match pit.find_by_id(file.partition_id) {
            Some(entry) if entry.is_flashable() => format!("--{}", entry.partition_name()),
            _ => format!("--{}", file.partition_id),
        };
        command.arg(flag).path_arg(&file.filename);
    }

    if firmware.no_reboot {
        command.no_reboot();
    }
    command
        .resume_if(options)
        .verbose_if(options)
        .arg(FLAG_STDOUT_ERRORS);

    Ok(FlashCommand {
        command,
        repartition_skipped,
    })
}
