//! Single PIT partition record.

use std::fmt;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::FormatError;

/// Names the table uses to describe itself. Never real storage targets.
pub const RESERVED_NAMES: [&str; 2] = ["PIT", "PT"];

/// Binary type: application processor.
pub const BINARY_TYPE_AP: u32 = 0;
/// Binary type: communication processor (modem).
pub const BINARY_TYPE_CP: u32 = 1;

/// Attribute bit: region is writable.
pub const ATTRIBUTE_WRITE: u32 = 1;
/// Attribute bit: region is managed by STL.
pub const ATTRIBUTE_STL: u32 = 1 << 1;

/// Update attribute bit: FOTA.
pub const UPDATE_ATTRIBUTE_FOTA: u32 = 1;
/// Update attribute bit: secure.
pub const UPDATE_ATTRIBUTE_SECURE: u32 = 1 << 1;

/// Storage type of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    OneNand,
    File,
    Mmc,
    All,
    Ufs,
    Unknown(u32),
}

impl From<u32> for DeviceType {
    fn from(value: u32) -> Self {
        match value {
            0 => DeviceType::OneNand,
            1 => DeviceType::File,
            2 => DeviceType::Mmc,
            3 => DeviceType::All,
            8 => DeviceType::Ufs,
            other => DeviceType::Unknown(other),
        }
    }
}

impl From<DeviceType> for u32 {
    fn from(value: DeviceType) -> Self {
        match value {
            DeviceType::OneNand => 0,
            DeviceType::File => 1,
            DeviceType::Mmc => 2,
            DeviceType::All => 3,
            DeviceType::Ufs => 8,
            DeviceType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::OneNand => write!(f, "OneNAND"),
            DeviceType::File => write!(f, "File/FAT"),
            DeviceType::Mmc => write!(f, "MMC"),
            DeviceType::All => write!(f, "All (?)"),
            DeviceType::Ufs => write!(f, "UFS"),
            DeviceType::Unknown(v) => write!(f, "Unknown ({})", v),
        }
    }
}

/// One partition descriptor.
///
/// Entries only come into existence by decoding a PIT buffer and are
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitEntry {
    binary_type: u32,
    device_type: DeviceType,
    identifier: u32,
    attributes: u32,
    update_attributes: u32,
    block_size_or_offset: u32,
    block_count: u32,
    file_offset: u32,
    file_size: u32,
    partition_name: String,
    flash_filename: String,
    fota_filename: String,
}

impl PitEntry {
    /// Encoded size of one record.
    pub const SIZE: usize = 132;
    /// Width of each fixed string field, terminator included.
    pub const STRING_FIELD_LEN: usize = 32;

    const PARTITION_NAME_OFFSET: usize = 36;
    const FLASH_FILENAME_OFFSET: usize = 68;
    const FOTA_FILENAME_OFFSET: usize = 100;

    /// Decode one record. `index` is only used for error reporting.
    pub(crate) fn decode(record: &[u8], index: usize) -> Result<Self, FormatError> {
        if record.len() < Self::SIZE {
            return Err(FormatError::TooShort {
                expected: Self::SIZE,
                actual: record.len(),
            });
        }

        let mut cursor = Cursor::new(record);
        let binary_type = cursor.read_u32::<LittleEndian>()?;
        let device_type = DeviceType::from(cursor.read_u32::<LittleEndian>()?);
        let identifier = cursor.read_u32::<LittleEndian>()?;
        let attributes = cursor.read_u32::<LittleEndian>()?;
        let update_attributes = cursor.read_u32::<LittleEndian>()?;
        let block_size_or_offset = cursor.read_u32::<LittleEndian>()?;
        let block_count = cursor.read_u32::<LittleEndian>()?;
        let file_offset = cursor.read_u32::<LittleEndian>()?;
        let file_size = cursor.read_u32::<LittleEndian>()?;

        let field = |offset: usize, name: &'static str| {
            decode_string(&record[offset..offset + Self::STRING_FIELD_LEN]).ok_or(
                FormatError::UnterminatedField {
                    entry: index,
                    field: name,
                },
            )
        };

        Ok(Self {
            binary_type,
            device_type,
            identifier,
            attributes,
            update_attributes,
            block_size_or_offset,
            block_count,
            file_offset,
            file_size,
            partition_name: field(Self::PARTITION_NAME_OFFSET, "partition name")?,
            flash_filename: field(Self::FLASH_FILENAME_OFFSET, "flash filename")?,
            fota_filename: field(Self::FOTA_FILENAME_OFFSET, "FOTA filename")?,
        })
    }

    /// Append the encoded record to `buf`.
    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        // Writes into a Vec cannot fail.
        for value in [
            self.binary_type,
            u32::from(self.device_type),
            self.identifier,
            self.attributes,
            self.update_attributes,
            self.block_size_or_offset,
            self.block_count,
            self.file_offset,
            self.file_size,
        ] {
            let _ = buf.write_u32::<LittleEndian>(value);
        }
        encode_string(buf, &self.partition_name);
        encode_string(buf, &self.flash_filename);
        encode_string(buf, &self.fota_filename);
    }

    pub fn identifier(&self) -> u32 {
        self.identifier
    }

    pub fn partition_name(&self) -> &str {
        &self.partition_name
    }

    /// Canonical image name. Empty when the partition has none.
    pub fn flash_filename(&self) -> &str {
        &self.flash_filename
    }

    pub fn fota_filename(&self) -> &str {
        &self.fota_filename
    }

    pub fn binary_type(&self) -> u32 {
        self.binary_type
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn attributes(&self) -> u32 {
        self.attributes
    }

    pub fn update_attributes(&self) -> u32 {
        self.update_attributes
    }

    pub fn block_size_or_offset(&self) -> u32 {
        self.block_size_or_offset
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn file_offset(&self) -> u32 {
        self.file_offset
    }

    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    /// Raw flashable flag as the flashing tool sees it: the record names a
    /// partition.
    pub fn has_flash_flag(&self) -> bool {
        !self.partition_name.is_empty()
    }

    /// Whether the entry is the table's own self-descriptor.
    pub fn is_reserved(&self) -> bool {
        RESERVED_NAMES.contains(&self.partition_name.as_str())
    }

    /// True for entries that describe a real writable storage region.
    pub fn is_flashable(&self) -> bool {
        self.has_flash_flag() && !self.is_reserved()
    }

    /// File extension the partition expects, taken from its flash filename.
    pub fn expected_extension(&self) -> Option<&str> {
        self.flash_filename
            .rfind('.')
            .map(|idx| &self.flash_filename[idx + 1..])
    }
}

impl fmt::Display for PitEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let binary = match self.binary_type {
            BINARY_TYPE_AP => "AP".to_string(),
            BINARY_TYPE_CP => "CP".to_string(),
            other => format!("Unknown ({})", other),
        };
        writeln!(f, "Binary Type: {}", binary)?;
        writeln!(f, "Device Type: {}", self.device_type)?;
        writeln!(f, "Identifier: {}", self.identifier)?;
        write!(f, "Attributes: {}", self.attributes)?;
        if self.attributes & ATTRIBUTE_WRITE != 0 {
            write!(f, " (Read/Write")?;
        } else {
            write!(f, " (Read-Only")?;
        }
        if self.attributes & ATTRIBUTE_STL != 0 {
            write!(f, ", STL")?;
        }
        writeln!(f, ")")?;
        writeln!(f, "Update Attributes: {}", self.update_attributes)?;
        writeln!(f, "Partition Block Size/Offset: {}", self.block_size_or_offset)?;
        writeln!(f, "Partition Block Count: {}", self.block_count)?;
        writeln!(f, "File Offset (Obsolete): {}", self.file_offset)?;
        writeln!(f, "File Size (Obsolete): {}", self.file_size)?;
        writeln!(f, "Partition Name: {}", self.partition_name)?;
        writeln!(f, "Flash Filename: {}", self.flash_filename)?;
        writeln!(f, "FOTA Filename: {}", self.fota_filename)
    }
}

/// Decode a NUL-terminated Latin-1 field. `None` if no terminator fits.
fn decode_string(field: &[u8]) -> Option<String> {
    let end = field.iter().position(|&b| b == 0)?;
    Some(field[..end].iter().map(|&b| b as char).collect())
}

fn encode_string(buf: &mut Vec<u8>, value: &str) {
    let mut field = [0u8; PitEntry::STRING_FIELD_LEN];
    for (slot, ch) in field
        .iter_mut()
        .take(PitEntry::STRING_FIELD_LEN - 1)
        .zip(value.chars())
    {
        *slot = u8::try_from(u32::from(ch)).unwrap_or(b'?');
    }
    buf.extend_from_slice(&field);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pit::test_support::EntrySpec;

    #[test]
    fn test_decode_fields() {
        let spec = EntrySpec::new(6, "BOOT", "boot.img");
        let record = spec.encode();
        assert_eq!(record.len(), PitEntry::SIZE);

        let entry = PitEntry::decode(&record, 0).unwrap();
        assert_eq!(entry.identifier(), 6);
        assert_eq!(entry.partition_name(), "BOOT");
        assert_eq!(entry.flash_filename(), "boot.img");
        assert_eq!(entry.device_type(), DeviceType::Mmc);
        assert!(entry.is_flashable());
        assert_eq!(entry.expected_extension(), Some("img"));
    }

    #[test]
    fn test_reserved_names_not_flashable() {
        for name in RESERVED_NAMES {
            let entry = PitEntry::decode(&EntrySpec::new(80, name, "").encode(), 0).unwrap();
            assert!(entry.has_flash_flag());
            assert!(entry.is_reserved());
            assert!(!entry.is_flashable());
        }

        // Case matters: only the exact descriptor names are reserved.
        let entry = PitEntry::decode(&EntrySpec::new(81, "pit", "").encode(), 0).unwrap();
        assert!(entry.is_flashable());
    }

    #[test]
    fn test_unnamed_entry_not_flashable() {
        let entry = PitEntry::decode(&EntrySpec::new(3, "", "").encode(), 0).unwrap();
        assert!(!entry.has_flash_flag());
        assert!(!entry.is_flashable());
        assert_eq!(entry.expected_extension(), None);
    }

    #[test]
    fn test_unterminated_name_rejected() {
        let mut record = EntrySpec::new(1, "BOOT", "").encode();
        for b in &mut record[36..68] {
            *b = b'A';
        }
        let err = PitEntry::decode(&record, 4).unwrap_err();
        assert!(matches!(
            err,
            FormatError::UnterminatedField {
                entry: 4,
                field: "partition name"
            }
        ));
    }

    #[test]
    fn test_encode_matches_source_record() {
        let record = EntrySpec::new(11, "RECOVERY", "recovery.img").encode();
        let entry = PitEntry::decode(&record, 0).unwrap();
        let mut out = Vec::new();
        entry.encode_into(&mut out);
        assert_eq!(out, record);
    }
}
