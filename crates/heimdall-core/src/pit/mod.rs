//! Partition Information Table (PIT) support.
//!
//! Layout (little-endian), matching the flashing tool's own reader:
//!
//! ```text
//! 0x00  u32      magic (0x12349876)
//! 0x04  u32      entry count
//! 0x08  [u8; 8]  "COM_TAR2"
//! 0x10  [u8; 8]  CPU / bootloader id
//! 0x18  u16      logical unit count
//! 0x1A  u16      padding
//! 0x1C  entry count x 132-byte records
//! ```
//!
//! Each record holds nine u32 fields (binary type, device type, identifier,
//! attributes, update attributes, block size/offset, block count, file
//! offset, file size) followed by three 32-byte NUL-terminated strings
//! (partition name, flash filename, FOTA filename).

pub mod entry;
pub mod table;

pub use entry::{DeviceType, PitEntry, RESERVED_NAMES};
pub use table::{PIT_MAGIC, PitTable};

use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("PIT buffer too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("Invalid PIT magic: 0x{actual:08X}")]
    BadMagic { actual: u32 },
    #[error("Invalid PIT entry count: {declared}")]
    BadEntryCount { declared: u32 },
    #[error("Entry {entry}: {field} is not NUL-terminated")]
    UnterminatedField { entry: usize, field: &'static str },
    #[error("Duplicate partition identifier {identifier}")]
    DuplicateIdentifier { identifier: u32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read and decode a PIT file from disk.
pub fn read_pit_file(path: &Path) -> Result<PitTable, FormatError> {
    let data = std::fs::read(path)?;
    PitTable::unpack(&data)
}
