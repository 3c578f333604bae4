//! Package archive extraction and construction.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::{Archive, Builder, EntryType, Header};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use super::manifest::{MANIFEST_NAME, Manifest};
use super::{PACKAGE_EXTENSION, PackageData, PackageError, PackageFile};
use crate::firmware::FirmwareInfo;

/// Extract a package, materializing every member under its own name in a
/// temp directory.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn extract_package(path: &Path) -> Result<PackageData, PackageError> {
    let not_an_archive = |e: io::Error| PackageError::NotAnArchive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let file = File::open(path).map_err(not_an_archive)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    let entries = archive.entries().map_err(not_an_archive)?;
    let mut manifest = None;
    let mut files: Vec<PackageFile> = Vec::new();

    for (index, entry) in entries.enumerate() {
        let mut entry = match entry {
            Ok(entry) => entry,
            // A bad gzip or tar header surfaces on the very first read.
            Err(e) if index == 0 => return Err(not_an_archive(e)),
            Err(e) => {
                return Err(PackageError::CorruptMember {
                    member: format!("#{}", index),
                    reason: e.to_string(),
                });
            }
        };

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let member = entry
            .path()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .ok_or_else(|| PackageError::CorruptMember {
                member: format!("#{}", index),
                reason: "invalid member name".into(),
            })?;
        let corrupt = |e: io::Error| PackageError::CorruptMember {
            member: member.clone(),
            reason: e.to_string(),
        };

        if member == MANIFEST_NAME {
            let mut text = String::new();
            entry.read_to_string(&mut text).map_err(corrupt)?;
            manifest = Some(Manifest::from_toml(&text)?);
            continue;
        }

        if files.iter().any(|f| f.member() == member) {
            return Err(PackageError::DuplicateMember(member));
        }

        let dir = tempfile::Builder::new().prefix("heimdall-").tempdir()?;
        let target = dir.path().join(&member);
        let mut out = File::create(&target)?;
        let size = io::copy(&mut entry, &mut out).map_err(corrupt)?;
        debug!(member = %member, size, temp = %target.display(), "Extracted member");
        files.push(PackageFile::new(member, dir));
    }

    let manifest = manifest.ok_or(PackageError::MissingManifest)?;
    info!(
        name = %manifest.firmware.name,
        version = %manifest.firmware.version,
        members = files.len(),
        "Extracted package"
    );

    Ok(PackageData::with_files(manifest.firmware, files))
}

/// Write `firmware` and every file it references to a package at
/// `destination`.
///
/// Members are written in a fixed order (manifest, PIT, then bindings in
/// list order) with zeroed timestamps and ownership, so identical input
/// gives identical archives. The destination is only replaced once the
/// whole archive has been written.
#[instrument(skip(firmware), fields(destination = %destination.display()))]
pub fn build_package(destination: &Path, firmware: &FirmwareInfo) -> Result<(), PackageError> {
    let manifest = Manifest::from_firmware(firmware)?;
    let manifest_text = manifest.to_toml()?;

    let pit_member = manifest.firmware.pit_filename.to_string_lossy().into_owned();
    let mut members = HashSet::from([MANIFEST_NAME.to_string()]);
    for name in std::iter::once(pit_member.clone()).chain(
        manifest
            .firmware
            .files
            .iter()
            .map(|f| f.filename.to_string_lossy().into_owned()),
    ) {
        if !members.insert(name.clone()) {
            return Err(PackageError::DuplicateMember(name));
        }
    }

    let dest_error = |source: io::Error| PackageError::WriteError {
        path: destination.to_path_buf(),
        source,
    };
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::with_prefix_in(".heimdall-package", parent).map_err(dest_error)?;

    let encoder = GzEncoder::new(BufWriter::new(temp), Compression::default());
    let mut builder = Builder::new(encoder);

    append_member(
        &mut builder,
        MANIFEST_NAME,
        manifest_text.len() as u64,
        manifest_text.as_bytes(),
    )
    .map_err(dest_error)?;
    append_file(&mut builder, &pit_member, &firmware.pit_filename, destination)?;
    for (file, stored) in firmware.files.iter().zip(&manifest.firmware.files) {
        let member = stored.filename.to_string_lossy();
        append_file(&mut builder, &member, &file.filename, destination)?;
    }

    let encoder = builder.into_inner().map_err(dest_error)?;
    let writer = encoder.finish().map_err(dest_error)?;
    let temp = writer.into_inner().map_err(|e| dest_error(e.into_error()))?;
    temp.persist(destination).map_err(|e| dest_error(e.error))?;

    info!(
        members = members.len(),
        "Built package {}",
        destination.display()
    );
    Ok(())
}

fn append_file<W: io::Write>(
    builder: &mut Builder<W>,
    member: &str,
    source: &Path,
    destination: &Path,
) -> Result<(), PackageError> {
    let source_error = |source_err: io::Error| PackageError::WriteError {
        path: source.to_path_buf(),
        source: source_err,
    };
    let file = File::open(source).map_err(source_error)?;
    let size = file.metadata().map_err(source_error)?.len();
    debug!(member, size, source = %source.display(), "Adding member");

    append_member(builder, member, size, BufReader::new(file)).map_err(|e| {
        PackageError::WriteError {
            path: destination.to_path_buf(),
            source: e,
        }
    })
}

fn append_member<W: io::Write, R: Read>(
    builder: &mut Builder<W>,
    member: &str,
    size: u64,
    data: R,
) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(size);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    builder.append_data(&mut header, member, data)
}

/// Coerce a destination path to end in `.tar.gz`.
///
/// `.tar`, `.gz` and `.tgz` endings are rewritten in place; anything else
/// gets the full suffix appended. Matching ignores ASCII case.
pub fn normalize_package_path(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if strip_suffix_ignore_case(&text, PACKAGE_EXTENSION).is_some() {
        return path.to_path_buf();
    }

    let stem = [".tar", ".gz", ".tgz"]
        .iter()
        .find_map(|suffix| strip_suffix_ignore_case(&text, suffix))
        .unwrap_or(&text);

    PathBuf::from(format!("{}{}", stem, PACKAGE_EXTENSION))
}

fn strip_suffix_ignore_case<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(suffix.len())?;
    if !text.is_char_boundary(split) {
        return None;
    }
    let (stem, tail) = text.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::{DeviceInfo, FileInfo, PlatformInfo};
    use crate::pit::test_support::sample_pit_bytes;
    use std::fs;
    use std::io::Write;

    fn write(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn firmware(dir: &Path) -> FirmwareInfo {
        FirmwareInfo {
            name: "Stock ROM".into(),
            version: "G991BXXU5".into(),
            url: "https://example.org".into(),
            donate_url: "https://example.org/donate".into(),
            pit_filename: write(dir, "o1s.pit", &sample_pit_bytes()),
            repartition: true,
            no_reboot: true,
            developers: vec!["alice".into(), "bob".into()],
            platform: PlatformInfo::new("Android", "13"),
            devices: vec![
                DeviceInfo::new("Samsung", "SM-G991B", "Galaxy S21"),
                DeviceInfo::new("Samsung", "SM-G991U", "Galaxy S21 (US)"),
            ],
            files: vec![
                FileInfo::new(6, write(dir, "boot.img", b"boot image")),
                FileInfo::new(7, write(dir, "recovery.img", b"recovery image")),
            ],
        }
    }

    fn member_names(path: &Path) -> Vec<String> {
        let file = File::open(path).unwrap();
        let mut archive = Archive::new(GzDecoder::new(file));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_build_then_extract() {
        let dir = tempfile::tempdir().unwrap();
        let source = firmware(dir.path());
        let package_path = dir.path().join("out.tar.gz");

        build_package(&package_path, &source).unwrap();
        assert_eq!(
            member_names(&package_path),
            vec!["firmware.toml", "o1s.pit", "boot.img", "recovery.img"]
        );

        let loaded = extract_package(&package_path).unwrap();
        let fw = loaded.firmware();
        assert_eq!(fw.name, source.name);
        assert_eq!(fw.version, source.version);
        assert_eq!(fw.platform, source.platform);
        assert_eq!(fw.devices, source.devices);
        assert_eq!(fw.developers, source.developers);
        assert_eq!(fw.url, source.url);
        assert_eq!(fw.donate_url, source.donate_url);
        assert!(fw.repartition);
        assert!(fw.no_reboot);
        assert_eq!(fw.pit_filename, PathBuf::from("o1s.pit"));

        let working = loaded.into_working();
        assert!(working.missing.is_empty());
        let files = &working.package.firmware().files;
        assert_eq!(files.len(), 2);
        for (got, want) in files.iter().zip(&source.files) {
            assert_eq!(got.partition_id, want.partition_id);
            assert_eq!(fs::read(&got.filename).unwrap(), fs::read(&want.filename).unwrap());
        }
        assert_eq!(
            fs::read(&working.package.firmware().pit_filename).unwrap(),
            sample_pit_bytes()
        );
    }

    #[test]
    fn test_rebuild_keeps_member_names() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.tar.gz");
        build_package(&first, &firmware(dir.path())).unwrap();

        let working = extract_package(&first).unwrap().into_working();
        let second = dir.path().join("second.tar.gz");
        build_package(&second, working.package.firmware()).unwrap();

        assert_eq!(
            member_names(&second),
            vec!["firmware.toml", "o1s.pit", "boot.img", "recovery.img"]
        );
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_build_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let source = firmware(dir.path());
        let first = dir.path().join("a.tar.gz");
        let second = dir.path().join("b.tar.gz");

        build_package(&first, &source).unwrap();
        build_package(&second, &source).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_build_unreadable_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = firmware(dir.path());
        source.files.push(FileInfo::new(9, dir.path().join("missing.img")));
        let package_path = dir.path().join("out.tar.gz");

        let err = build_package(&package_path, &source).unwrap_err();
        match err {
            PackageError::WriteError { path, .. } => assert!(path.ends_with("missing.img")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!package_path.exists());
    }

    #[test]
    fn test_build_rejects_duplicate_basenames() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = firmware(dir.path());
        let other = dir.path().join("other");
        fs::create_dir(&other).unwrap();
        source
            .files
            .push(FileInfo::new(9, write(&other, "boot.img", b"second")));

        assert!(matches!(
            build_package(&dir.path().join("out.tar.gz"), &source),
            Err(PackageError::DuplicateMember(name)) if name == "boot.img"
        ));
    }

    #[test]
    fn test_extract_rejects_non_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "junk.tar.gz", b"definitely not gzip");
        assert!(matches!(
            extract_package(&path),
            Err(PackageError::NotAnArchive { .. })
        ));
    }

    #[test]
    fn test_extract_missing_file_is_not_an_archive() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            extract_package(&dir.path().join("absent.tar.gz")),
            Err(PackageError::NotAnArchive { .. })
        ));
    }

    #[test]
    fn test_extract_requires_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nomanifest.tar.gz");
        let encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        let mut builder = Builder::new(encoder);
        append_member(&mut builder, "boot.img", 4, &b"boot"[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap().flush().unwrap();

        assert!(matches!(
            extract_package(&path),
            Err(PackageError::MissingManifest)
        ));
    }

    #[test]
    fn test_normalize_package_path() {
        let cases = [
            ("pkg", "pkg.tar.gz"),
            ("pkg.tar", "pkg.tar.gz"),
            ("pkg.gz", "pkg.tar.gz"),
            ("pkg.tgz", "pkg.tar.gz"),
            ("pkg.tar.gz", "pkg.tar.gz"),
            ("dir/PKG.TAR.GZ", "dir/PKG.TAR.GZ"),
            ("dir/pkg.TGZ", "dir/pkg.tar.gz"),
            ("pkg.zip", "pkg.zip.tar.gz"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                normalize_package_path(Path::new(input)),
                PathBuf::from(expected),
                "{}",
                input
            );
        }
    }
}
