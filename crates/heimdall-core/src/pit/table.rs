//! Partition Information Table container.

use std::collections::HashSet;
use std::fmt;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use super::FormatError;
use super::entry::PitEntry;

/// Magic number at the start of every PIT file.
pub const PIT_MAGIC: u32 = 0x1234_9876;

/// Parsed PIT.
///
/// The empty table is the cleared state. A failed load always leaves the
/// table cleared; no partially decoded entries are ever observable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PitTable {
    com_tar2: [u8; 8],
    cpu_bl_id: [u8; 8],
    lu_count: u16,
    entries: Vec<PitEntry>,
}

impl PitTable {
    /// Size of the fixed header preceding the records.
    pub const HEADER_SIZE: usize = 28;
    /// Encoded files are padded up to a multiple of this.
    pub const PADDING_MULTIPLE: usize = 4096;

    /// Decode a PIT buffer.
    pub fn unpack(data: &[u8]) -> Result<Self, FormatError> {
        if data.len() < Self::HEADER_SIZE {
            return Err(FormatError::TooShort {
                expected: Self::HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != PIT_MAGIC {
            return Err(FormatError::BadMagic { actual: magic });
        }

        let declared = cursor.read_u32::<LittleEndian>()?;
        let count = usize::try_from(declared).map_err(|_| FormatError::BadEntryCount { declared })?;
        let required = count
            .checked_mul(PitEntry::SIZE)
            .and_then(|n| n.checked_add(Self::HEADER_SIZE))
            .ok_or(FormatError::BadEntryCount { declared })?;
        if data.len() < required {
            return Err(FormatError::TooShort {
                expected: required,
                actual: data.len(),
            });
        }

        let mut com_tar2 = [0u8; 8];
        com_tar2.copy_from_slice(&data[8..16]);
        let mut cpu_bl_id = [0u8; 8];
        cpu_bl_id.copy_from_slice(&data[16..24]);
        cursor.set_position(24);
        let lu_count = cursor.read_u16::<LittleEndian>()?;

        let mut entries = Vec::with_capacity(count);
        let mut seen = HashSet::with_capacity(count);
        for index in 0..count {
            let start = Self::HEADER_SIZE + index * PitEntry::SIZE;
            let entry = PitEntry::decode(&data[start..start + PitEntry::SIZE], index)?;
            if !seen.insert(entry.identifier()) {
                return Err(FormatError::DuplicateIdentifier {
                    identifier: entry.identifier(),
                });
            }
            entries.push(entry);
        }

        debug!(entries = count, "Unpacked PIT");

        Ok(Self {
            com_tar2,
            cpu_bl_id,
            lu_count,
            entries,
        })
    }

    /// Replace this table with the decoded contents of `data`.
    ///
    /// On failure the table is cleared.
    pub fn load(&mut self, data: &[u8]) -> Result<(), FormatError> {
        match Self::unpack(data) {
            Ok(table) => {
                *self = table;
                Ok(())
            }
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    /// Encode the table, zero-padded to [`Self::padded_size`].
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.padded_size());
        let _ = buf.write_u32::<LittleEndian>(PIT_MAGIC);
        let _ = buf.write_u32::<LittleEndian>(self.entries.len() as u32);
        buf.extend_from_slice(&self.com_tar2);
        buf.extend_from_slice(&self.cpu_bl_id);
        let _ = buf.write_u16::<LittleEndian>(self.lu_count);
        let _ = buf.write_u16::<LittleEndian>(0);
        for entry in &self.entries {
            entry.encode_into(&mut buf);
        }
        buf.resize(self.padded_size(), 0);
        buf
    }

    /// Unpadded encoded size.
    pub fn data_size(&self) -> usize {
        Self::HEADER_SIZE + self.entries.len() * PitEntry::SIZE
    }

    pub fn padded_size(&self) -> usize {
        self.data_size().div_ceil(Self::PADDING_MULTIPLE) * Self::PADDING_MULTIPLE
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_cleared(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, index: usize) -> Option<&PitEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PitEntry> {
        self.entries.iter()
    }

    /// Look up an entry by identifier.
    pub fn find_by_id(&self, identifier: u32) -> Option<&PitEntry> {
        self.entries.iter().find(|e| e.identifier() == identifier)
    }

    /// Look up an entry by partition name. Comparison is byte-exact.
    pub fn find_by_name(&self, name: &str) -> Option<&PitEntry> {
        self.entries.iter().find(|e| e.partition_name() == name)
    }

    /// Identifiers of every flashable entry, in table order.
    pub fn flashable_ids(&self) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|e| e.is_flashable())
            .map(PitEntry::identifier)
            .collect()
    }

    pub fn com_tar2(&self) -> String {
        fixed_ascii(&self.com_tar2)
    }

    pub fn cpu_bl_id(&self) -> String {
        fixed_ascii(&self.cpu_bl_id)
    }

    pub fn lu_count(&self) -> u16 {
        self.lu_count
    }
}

impl fmt::Display for PitTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- PIT Header ---")?;
        writeln!(f, "Entry Count: {}", self.entries.len())?;
        writeln!(f, "Unknown string: {}", self.com_tar2())?;
        writeln!(f, "CPU/bootloader tag: {}", self.cpu_bl_id())?;
        writeln!(f, "Logic unit count: {}", self.lu_count)?;
        for (i, entry) in self.entries.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "--- Entry #{} ---", i)?;
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

fn fixed_ascii(field: &[u8]) -> String {
    field
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}
