//! Package manifest (`firmware.toml`).
//!
//! The manifest stores a [`FirmwareInfo`] whose PIT and partition file
//! paths are reduced to archive member names.

use serde::{Deserialize, Serialize};

use super::PackageError;
use crate::firmware::{FileInfo, FirmwareInfo, basename};

/// Member name of the manifest inside a package.
pub const MANIFEST_NAME: &str = "firmware.toml";

/// Current manifest format revision.
pub const MANIFEST_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format: u32,
    pub firmware: FirmwareInfo,
}

impl Manifest {
    /// Build a manifest from a working firmware, reducing every path to its
    /// basename.
    pub fn from_firmware(firmware: &FirmwareInfo) -> Result<Self, PackageError> {
        let mut stored = firmware.clone();

        stored.pit_filename = basename(&firmware.pit_filename)
            .ok_or(PackageError::MissingPit)?
            .into();

        stored.files = firmware
            .files
            .iter()
            .map(|file| {
                let name = file.basename().ok_or(PackageError::UnboundPartition {
                    id: file.partition_id,
                })?;
                Ok(FileInfo::new(file.partition_id, name))
            })
            .collect::<Result<_, PackageError>>()?;

        Ok(Self {
            format: MANIFEST_FORMAT,
            firmware: stored,
        })
    }

    pub fn to_toml(&self) -> Result<String, PackageError> {
        toml::to_string_pretty(self).map_err(|e| PackageError::InvalidManifest(e.to_string()))
    }

    pub fn from_toml(text: &str) -> Result<Self, PackageError> {
        let manifest: Manifest =
            toml::from_str(text).map_err(|e| PackageError::InvalidManifest(e.to_string()))?;
        if manifest.format > MANIFEST_FORMAT {
            return Err(PackageError::InvalidManifest(format!(
                "unsupported manifest format {}",
                manifest.format
            )));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::{DeviceInfo, PlatformInfo};

    fn firmware() -> FirmwareInfo {
        FirmwareInfo {
            name: "Stock ROM".into(),
            version: "G991BXXU5".into(),
            url: "https://example.org".into(),
            donate_url: String::new(),
            pit_filename: "/work/o1s.pit".into(),
            repartition: true,
            no_reboot: false,
            developers: vec!["alice".into(), "bob".into()],
            platform: PlatformInfo::new("Android", "13"),
            devices: vec![DeviceInfo::new("Samsung", "SM-G991B", "Galaxy S21")],
            files: vec![
                FileInfo::new(6, "/work/images/boot.img"),
                FileInfo::new(7, "/work/images/recovery.img"),
            ],
        }
    }

    #[test]
    fn test_paths_reduced_to_basenames() {
        let manifest = Manifest::from_firmware(&firmware()).unwrap();
        assert_eq!(manifest.firmware.pit_filename.to_str(), Some("o1s.pit"));
        assert_eq!(
            manifest.firmware.files,
            vec![FileInfo::new(6, "boot.img"), FileInfo::new(7, "recovery.img")]
        );
        assert_eq!(manifest.firmware.developers, firmware().developers);
    }

    #[test]
    fn test_toml_text_parses_back() {
        let manifest = Manifest::from_firmware(&firmware()).unwrap();
        let text = manifest.to_toml().unwrap();
        assert!(text.contains("format = 1"));
        assert!(text.contains("[firmware.platform]"));
        assert_eq!(Manifest::from_toml(&text).unwrap(), manifest);
    }

    #[test]
    fn test_unbound_file_rejected() {
        let mut fw = firmware();
        fw.files.push(FileInfo::new(9, ""));
        assert!(matches!(
            Manifest::from_firmware(&fw),
            Err(PackageError::UnboundPartition { id: 9 })
        ));
    }

    #[test]
    fn test_future_format_rejected() {
        let text = "format = 99\n[firmware]\nname = \"x\"\n";
        assert!(matches!(
            Manifest::from_toml(text),
            Err(PackageError::InvalidManifest(_))
        ));
    }
}
