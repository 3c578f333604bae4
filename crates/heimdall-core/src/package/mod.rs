//! Firmware packages: a gzip-compressed tar holding a manifest, a PIT and
//! one image per bound partition.

pub mod codec;
pub mod manifest;

pub use codec::{build_package, extract_package, normalize_package_path};
pub use manifest::{MANIFEST_NAME, Manifest};

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::warn;

use crate::firmware::{FileInfo, FirmwareInfo};

/// Canonical package suffix.
pub const PACKAGE_EXTENSION: &str = ".tar.gz";

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("{path} is not a firmware package archive: {reason}")]
    NotAnArchive { path: PathBuf, reason: String },
    #[error("Package does not contain {}", MANIFEST_NAME)]
    MissingManifest,
    #[error("Corrupt package member {member}: {reason}")]
    CorruptMember { member: String, reason: String },
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("Failed to write package {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Partition {id} has no file")]
    UnboundPartition { id: u32 },
    #[error("Firmware has no PIT file")]
    MissingPit,
    #[error("Two package members would be named {0}")]
    DuplicateMember(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An archive member materialized in its own temporary directory, under
/// its member name.
///
/// The directory is deleted when this value is dropped.
#[derive(Debug)]
pub struct PackageFile {
    member: String,
    path: PathBuf,
    _dir: TempDir,
}

impl PackageFile {
    /// `dir` must already hold the extracted copy named `member`.
    pub(crate) fn new(member: String, dir: TempDir) -> Self {
        let path = dir.path().join(&member);
        Self {
            member,
            path,
            _dir: dir,
        }
    }

    /// Name of the member inside the archive.
    pub fn member(&self) -> &str {
        &self.member
    }

    /// Location of the extracted copy on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Firmware metadata plus the extracted files backing it.
///
/// Two of these exist side by side: the *loaded* package (freshly
/// extracted, only inspected) and the *working* package (edited and
/// flashed). [`PackageData::into_working`] moves the former into the latter.
#[derive(Debug, Default)]
pub struct PackageData {
    firmware: FirmwareInfo,
    files: Vec<PackageFile>,
}

/// Result of turning a loaded package into a working one.
#[derive(Debug)]
pub struct WorkingPackage {
    pub package: PackageData,
    /// Members named by the manifest that the archive did not contain.
    pub missing: Vec<String>,
}

impl PackageData {
    pub fn new(firmware: FirmwareInfo) -> Self {
        Self {
            firmware,
            files: Vec::new(),
        }
    }

    pub(crate) fn with_files(firmware: FirmwareInfo, files: Vec<PackageFile>) -> Self {
        Self { firmware, files }
    }

    pub fn firmware(&self) -> &FirmwareInfo {
        &self.firmware
    }

    pub fn firmware_mut(&mut self) -> &mut FirmwareInfo {
        &mut self.firmware
    }

    pub fn files(&self) -> &[PackageFile] {
        &self.files
    }

    /// Extracted copy of an archive member.
    pub fn file(&self, member: &str) -> Option<&PackageFile> {
        self.files.iter().find(|f| f.member == member)
    }

    /// Drop the metadata and delete every backing file.
    pub fn clear(&mut self) {
        self.firmware.clear();
        self.files.clear();
    }

    pub fn is_cleared(&self) -> bool {
        self.firmware.is_cleared() && self.files.is_empty()
    }

    /// Take ownership of an extracted package for flashing.
    ///
    /// Every binding and the PIT path are repointed at the extracted temp
    /// files, which keep their member names. Bindings whose member is absent are dropped and reported.
    pub fn into_working(self) -> WorkingPackage {
        let PackageData { firmware, files } = self;
        let mut missing = Vec::new();

        let mut working = FirmwareInfo {
            files: Vec::with_capacity(firmware.files.len()),
            pit_filename: PathBuf::new(),
            ..firmware.clone()
        };

        for file in &firmware.files {
            let member = file.filename.to_string_lossy();
            match files.iter().find(|f| f.member == member) {
                Some(extracted) => working
                    .files
                    .push(FileInfo::new(file.partition_id, extracted.path())),
                None => {
                    warn!(member = %member, "Package member missing");
                    missing.push(member.into_owned());
                }
            }
        }

        let pit_member = firmware.pit_filename.to_string_lossy();
        if let Some(pit) = files.iter().find(|f| f.member == pit_member) {
            working.pit_filename = pit.path().to_path_buf();
        } else if !pit_member.is_empty() {
            warn!(member = %pit_member, "PIT member missing");
            missing.push(pit_member.into_owned());
        }

        WorkingPackage {
            package: PackageData {
                firmware: working,
                files,
            },
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_member(member: &str, contents: &[u8]) -> PackageFile {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(member), contents).unwrap();
        PackageFile::new(member.to_string(), dir)
    }

    #[test]
    fn test_into_working_rebinds_to_temp_files() {
        let mut firmware = FirmwareInfo::default();
        firmware.name = "pkg".into();
        firmware.pit_filename = "device.pit".into();
        firmware.repartition = true;
        firmware.files.push(FileInfo::new(6, "boot.img"));
        firmware.files.push(FileInfo::new(7, "recovery.img"));

        let loaded = PackageData::with_files(
            firmware,
            vec![temp_member("device.pit", b"pit"), temp_member("boot.img", b"boot")],
        );
        let boot_path = loaded.file("boot.img").unwrap().path().to_path_buf();

        let WorkingPackage { package, missing } = loaded.into_working();
        assert_eq!(missing, vec!["recovery.img".to_string()]);
        assert_eq!(package.firmware().files, vec![FileInfo::new(6, &boot_path)]);
        assert_eq!(
            package.firmware().pit_filename.as_path(),
            package.file("device.pit").unwrap().path()
        );
        assert!(package.firmware().repartition);
        assert!(boot_path.exists());
        assert_eq!(package.firmware().files[0].basename().as_deref(), Some("boot.img"));
    }

    #[test]
    fn test_clear_deletes_backing_files() {
        let mut package = PackageData::with_files(
            FirmwareInfo::default(),
            vec![temp_member("boot.img", b"boot")],
        );
        let path = package.files()[0].path().to_path_buf();
        assert!(path.exists());
        assert!(!package.is_cleared());

        package.clear();
        assert!(package.is_cleared());
        assert!(!path.exists());
    }
}
