//! Firmware metadata and partition bindings.
//!
//! A [`FirmwareInfo`] is a plain value: bindings are addressed by their
//! index in [`FirmwareInfo::files`] and every mutation goes through
//! `&mut self`. Cross-references to a [`PitTable`] are only checked when
//! asked for (at the latest when building a flash command).

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pit::PitTable;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Partition {id} does not exist in the PIT")]
    UnknownPartition { id: u32 },
    #[error("Partition {id} is not flashable")]
    NotFlashable { id: u32 },
    #[error("Partition {id} is already bound")]
    PartitionInUse { id: u32 },
    #[error("No partition binding at index {index}")]
    BindingOutOfRange { index: usize },
    #[error("Partition {id} has no file")]
    UnboundFile { id: u32 },
    #[error("No partitions are bound")]
    NoBindings,
    #[error("No PIT file is set")]
    MissingPit,
    #[error("No unused partitions left")]
    NoUnusedPartition,
}

/// Binding of a partition slot to a source image.
///
/// An empty `filename` reserves the slot without a file, which is fine
/// while editing but not for flashing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(rename = "id")]
    pub partition_id: u32,
    pub filename: PathBuf,
}

impl FileInfo {
    pub fn new(partition_id: u32, filename: impl Into<PathBuf>) -> Self {
        Self {
            partition_id,
            filename: filename.into(),
        }
    }

    pub fn is_bound(&self) -> bool {
        !self.filename.as_os_str().is_empty()
    }

    /// Archive member name for this file.
    pub fn basename(&self) -> Option<String> {
        basename(&self.filename)
    }
}

/// One hardware variant a firmware supports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub product: String,
    pub name: String,
}

impl DeviceInfo {
    pub fn new(
        manufacturer: impl Into<String>,
        product: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            product: product.into(),
            name: name.into(),
        }
    }

    /// All three fields are required before a device can be listed.
    pub fn is_complete(&self) -> bool {
        !(self.manufacturer.is_empty() || self.product.is_empty() || self.name.is_empty())
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.manufacturer, self.name, self.product)
    }
}

/// Target chipset/platform family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub name: String,
    pub version: String,
}

impl PlatformInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.version)
    }
}

/// A file was bound to a partition whose canonical image has another
/// extension. Only a warning; the binding is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionMismatch {
    pub partition: String,
    pub expected: String,
}

impl fmt::Display for ExtensionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} partition expects files with file extension \"{}\".",
            self.partition, self.expected
        )
    }
}

/// Firmware metadata plus ordered partition bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareInfo {
    pub name: String,
    pub version: String,
    pub url: String,
    pub donate_url: String,
    #[serde(rename = "pit")]
    pub pit_filename: PathBuf,
    pub repartition: bool,
    pub no_reboot: bool,
    pub developers: Vec<String>,
    pub platform: PlatformInfo,
    pub devices: Vec<DeviceInfo>,
    pub files: Vec<FileInfo>,
}

impl FirmwareInfo {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_cleared(&self) -> bool {
        *self == Self::default()
    }

    /// Flashable PIT identifiers not yet bound, in table order.
    ///
    /// Derived on every call; never stored.
    pub fn unused_partition_ids(&self, pit: &PitTable) -> Vec<u32> {
        pit.flashable_ids()
            .into_iter()
            .filter(|id| !self.is_bound(*id))
            .collect()
    }

    pub fn is_bound(&self, partition_id: u32) -> bool {
        self.files.iter().any(|f| f.partition_id == partition_id)
    }

    /// Add an unbound slot on the first unused partition. Returns its index.
    pub fn add_binding(&mut self, pit: &PitTable) -> Result<usize, ValidationError> {
        let id = *self
            .unused_partition_ids(pit)
            .first()
            .ok_or(ValidationError::NoUnusedPartition)?;
        self.files.push(FileInfo::new(id, PathBuf::new()));
        Ok(self.files.len() - 1)
    }

    pub fn remove_binding(&mut self, index: usize) -> Result<FileInfo, ValidationError> {
        if index >= self.files.len() {
            return Err(ValidationError::BindingOutOfRange { index });
        }
        Ok(self.files.remove(index))
    }

    /// Move the binding at `index` onto another, currently unused partition.
    pub fn set_binding_partition(
        &mut self,
        index: usize,
        partition_id: u32,
        pit: &PitTable,
    ) -> Result<Option<ExtensionMismatch>, ValidationError> {
        let current = self
            .files
            .get(index)
            .ok_or(ValidationError::BindingOutOfRange { index })?
            .partition_id;
        if current == partition_id {
            return Ok(None);
        }

        let entry = pit
            .find_by_id(partition_id)
            .ok_or(ValidationError::UnknownPartition { id: partition_id })?;
        if !entry.is_flashable() {
            return Err(ValidationError::NotFlashable { id: partition_id });
        }
        if self.is_bound(partition_id) {
            return Err(ValidationError::PartitionInUse { id: partition_id });
        }

        let file = &mut self.files[index];
        file.partition_id = partition_id;
        if file.is_bound() {
            Ok(extension_mismatch(pit, partition_id, &file.filename))
        } else {
            Ok(None)
        }
    }

    /// Point the binding at `index` to `path`.
    pub fn set_binding_file(
        &mut self,
        index: usize,
        path: impl Into<PathBuf>,
        pit: &PitTable,
    ) -> Result<Option<ExtensionMismatch>, ValidationError> {
        let file = self
            .files
            .get_mut(index)
            .ok_or(ValidationError::BindingOutOfRange { index })?;
        file.filename = path.into();
        Ok(extension_mismatch(pit, file.partition_id, &file.filename))
    }

    /// Every binding must name a partition present in `pit`.
    pub fn validate_against(&self, pit: &PitTable) -> Result<(), ValidationError> {
        for file in &self.files {
            if pit.find_by_id(file.partition_id).is_none() {
                return Err(ValidationError::UnknownPartition {
                    id: file.partition_id,
                });
            }
        }
        Ok(())
    }

    /// Checks run before a flash command is built.
    pub fn check_ready_to_flash(&self, pit: &PitTable) -> Result<(), ValidationError> {
        if self.files.is_empty() {
            return Err(ValidationError::NoBindings);
        }
        if self.pit_filename.as_os_str().is_empty() {
            return Err(ValidationError::MissingPit);
        }
        if let Some(file) = self.files.iter().find(|f| !f.is_bound()) {
            return Err(ValidationError::UnboundFile {
                id: file.partition_id,
            });
        }
        self.validate_against(pit)
    }

    /// Names of the metadata fields still empty before a package can be built.
    pub fn missing_package_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_empty() {
            missing.push("name");
        }
        if self.version.is_empty() {
            missing.push("version");
        }
        if self.platform.name.is_empty() {
            missing.push("platform name");
        }
        if self.platform.version.is_empty() {
            missing.push("platform version");
        }
        if self.developers.is_empty() {
            missing.push("developers");
        }
        if self.devices.is_empty() {
            missing.push("devices");
        }
        missing
    }

    /// Carry bindings from `old` into `new` by partition name.
    ///
    /// Bindings whose partition is unknown to either table are dropped;
    /// their former names (or ids) are returned.
    pub fn remap_partitions(&mut self, old: &PitTable, new: &PitTable) -> Vec<String> {
        let mut dropped = Vec::new();
        self.files.retain_mut(|file| {
            let name = old
                .find_by_id(file.partition_id)
                .map(|e| e.partition_name().to_string());
            match name.as_deref().and_then(|n| new.find_by_name(n)) {
                Some(entry) => {
                    file.partition_id = entry.identifier();
                    true
                }
                None => {
                    dropped.push(name.unwrap_or_else(|| file.partition_id.to_string()));
                    false
                }
            }
        });
        dropped
    }
}

fn extension_mismatch(pit: &PitTable, partition_id: u32, path: &Path) -> Option<ExtensionMismatch> {
    let entry = pit.find_by_id(partition_id)?;
    let expected = entry.expected_extension()?;
    let actual = path.to_str().and_then(|p| p.rfind('.').map(|idx| &p[idx + 1..]));
    if actual == Some(expected) {
        return None;
    }
    Some(ExtensionMismatch {
        partition: entry.partition_name().to_string(),
        expected: expected.to_string(),
    })
}

pub(crate) fn basename(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pit::test_support::{EntrySpec, build_pit, sample_pit};

    fn assert_partition_invariant(firmware: &FirmwareInfo, pit: &PitTable) {
        let unused = firmware.unused_partition_ids(pit);
        let bound: Vec<u32> = firmware.files.iter().map(|f| f.partition_id).collect();
        for id in &unused {
            assert!(!bound.contains(id), "{} both bound and unused", id);
        }
        for id in pit.flashable_ids() {
            assert!(unused.contains(&id) || bound.contains(&id), "{} lost", id);
        }
    }

    #[test]
    fn test_unused_ids_track_bindings() {
        let pit = sample_pit();
        let mut firmware = FirmwareInfo::default();
        assert_eq!(firmware.unused_partition_ids(&pit), pit.flashable_ids());
        assert_partition_invariant(&firmware, &pit);

        let first = firmware.add_binding(&pit).unwrap();
        assert_eq!(firmware.files[first].partition_id, 1);
        assert!(!firmware.files[first].is_bound());
        assert_partition_invariant(&firmware, &pit);

        firmware.add_binding(&pit).unwrap();
        firmware.set_binding_partition(1, 9, &pit).unwrap();
        assert_partition_invariant(&firmware, &pit);
        assert!(!firmware.unused_partition_ids(&pit).contains(&9));
        assert!(firmware.unused_partition_ids(&pit).contains(&4));

        firmware.remove_binding(0).unwrap();
        assert_partition_invariant(&firmware, &pit);
        assert!(firmware.unused_partition_ids(&pit).contains(&1));
    }

    #[test]
    fn test_add_binding_exhausts_partitions() {
        let pit = sample_pit();
        let mut firmware = FirmwareInfo::default();
        for _ in 0..pit.flashable_ids().len() {
            firmware.add_binding(&pit).unwrap();
            assert_partition_invariant(&firmware, &pit);
        }
        assert_eq!(
            firmware.add_binding(&pit),
            Err(ValidationError::NoUnusedPartition)
        );
    }

    #[test]
    fn test_set_binding_partition_rules() {
        let pit = sample_pit();
        let mut firmware = FirmwareInfo::default();
        firmware.files.push(FileInfo::new(6, "boot.img"));
        firmware.files.push(FileInfo::new(7, "recovery.img"));

        assert_eq!(
            firmware.set_binding_partition(0, 7, &pit),
            Err(ValidationError::PartitionInUse { id: 7 })
        );
        assert_eq!(
            firmware.set_binding_partition(0, 80, &pit),
            Err(ValidationError::NotFlashable { id: 80 })
        );
        assert_eq!(
            firmware.set_binding_partition(0, 500, &pit),
            Err(ValidationError::UnknownPartition { id: 500 })
        );
        assert_eq!(
            firmware.set_binding_partition(5, 9, &pit),
            Err(ValidationError::BindingOutOfRange { index: 5 })
        );

        let warning = firmware.set_binding_partition(0, 1, &pit).unwrap();
        assert_eq!(
            warning,
            Some(ExtensionMismatch {
                partition: "SBOOT".into(),
                expected: "bin".into()
            })
        );
        assert_eq!(firmware.files[0].partition_id, 1);
    }

    #[test]
    fn test_set_binding_file_warns_on_extension() {
        let pit = sample_pit();
        let mut firmware = FirmwareInfo::default();
        firmware.files.push(FileInfo::new(6, ""));

        assert_eq!(
            firmware.set_binding_file(0, "/tmp/boot.img", &pit).unwrap(),
            None
        );
        let warning = firmware
            .set_binding_file(0, "/tmp/boot.img.lz4", &pit)
            .unwrap()
            .unwrap();
        assert_eq!(
            warning.to_string(),
            "BOOT partition expects files with file extension \"img\"."
        );
        assert_eq!(firmware.files[0].filename, PathBuf::from("/tmp/boot.img.lz4"));
    }

    #[test]
    fn test_ready_to_flash() {
        let pit = sample_pit();
        let mut firmware = FirmwareInfo::default();
        assert_eq!(
            firmware.check_ready_to_flash(&pit),
            Err(ValidationError::NoBindings)
        );

        firmware.files.push(FileInfo::new(6, "boot.img"));
        assert_eq!(
            firmware.check_ready_to_flash(&pit),
            Err(ValidationError::MissingPit)
        );

        firmware.pit_filename = "device.pit".into();
        firmware.files.push(FileInfo::new(7, ""));
        assert_eq!(
            firmware.check_ready_to_flash(&pit),
            Err(ValidationError::UnboundFile { id: 7 })
        );

        firmware.files[1].filename = "recovery.img".into();
        assert!(firmware.check_ready_to_flash(&pit).is_ok());

        firmware.files.push(FileInfo::new(42, "x.img"));
        assert_eq!(
            firmware.check_ready_to_flash(&pit),
            Err(ValidationError::UnknownPartition { id: 42 })
        );
    }

    #[test]
    fn test_remap_by_name() {
        let old = sample_pit();
        let new = PitTable::unpack(&build_pit(&[
            EntrySpec::new(70, "PIT", ""),
            EntrySpec::new(20, "BOOT", "boot.img"),
            EntrySpec::new(21, "SYSTEM", "system.img"),
        ]))
        .unwrap();

        let mut firmware = FirmwareInfo::default();
        firmware.files.push(FileInfo::new(6, "boot.img"));
        firmware.files.push(FileInfo::new(7, "recovery.img"));
        firmware.files.push(FileInfo::new(9, "system.img"));

        let dropped = firmware.remap_partitions(&old, &new);
        assert_eq!(dropped, vec!["RECOVERY".to_string()]);
        assert_eq!(
            firmware.files,
            vec![FileInfo::new(20, "boot.img"), FileInfo::new(21, "system.img")]
        );
    }

    #[test]
    fn test_missing_package_fields() {
        let mut firmware = FirmwareInfo::default();
        assert_eq!(firmware.missing_package_fields().len(), 6);

        firmware.name = "Stock".into();
        firmware.version = "1.0".into();
        firmware.platform = PlatformInfo::new("Android", "11");
        firmware.developers.push("someone".into());
        firmware.devices.push(DeviceInfo::new("Samsung", "SM-G991B", "Galaxy S21"));
        assert!(firmware.missing_package_fields().is_empty());
        assert_eq!(
            firmware.devices[0].to_string(),
            "Samsung Galaxy S21: SM-G991B"
        );
    }
}
