//! Samsung quick-convert: map loose vendor images onto PIT partitions.
//!
//! Matching is first-hit, not scored. For each file a list of candidate
//! partition names is derived from keywords in its lowercased basename,
//! followed by the uppercased basename itself. Candidates are looked up by
//! exact name; if none exists the flashable entries are scanned for a flash
//! filename equal to or containing the extension-stripped basename.

use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::firmware::{FileInfo, FirmwareInfo, PlatformInfo};
use crate::pit::{FormatError, PitTable, read_pit_file};

/// Raw archive suffixes. Such files hold images but are not images.
const ARCHIVE_SUFFIXES: [&str; 2] = [".tar", ".md5"];

/// Name given to converted firmware.
pub const CONVERSION_NAME: &str = "Samsung Conversion";

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Failed to read PIT file: {0}")]
    Pit(#[from] FormatError),
    #[error("{}", no_match_message(.skipped))]
    NoFilesMatched { skipped: Vec<String> },
}

fn no_match_message(skipped: &[String]) -> String {
    let mut msg =
        "No files could be mapped. Ensure you select extracted images (not .tar/.md5).".to_string();
    if !skipped.is_empty() {
        msg.push_str("\nSkipped archives: ");
        msg.push_str(&skipped.join(", "));
    }
    msg
}

/// Result of matching a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(u32),
    /// A `.tar`/`.md5` archive; never matched.
    Skipped,
    Unmatched,
}

/// Outcome of matching a batch of files.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MatchReport {
    /// One binding per matched file, in input order.
    pub bindings: Vec<FileInfo>,
    /// Lowercased basenames of skipped archives.
    pub skipped: Vec<String>,
    pub unmatched: Vec<PathBuf>,
}

pub struct PartitionMatcher<'a> {
    pit: &'a PitTable,
}

impl<'a> PartitionMatcher<'a> {
    pub fn new(pit: &'a PitTable) -> Self {
        Self { pit }
    }

    pub fn match_file(&self, path: &Path) -> MatchOutcome {
        let lower = lowercase_basename(path);
        if ARCHIVE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
            return MatchOutcome::Skipped;
        }

        let stripped = strip_extensions(&lower);
        let candidates = candidate_names(&lower);

        let by_name = candidates
            .iter()
            .find_map(|name| self.pit.find_by_name(name))
            .map(|entry| entry.identifier());
        match by_name.or_else(|| self.find_by_flash_filename(stripped)) {
            Some(id) => {
                debug!(file = %lower, id, "Matched partition");
                MatchOutcome::Matched(id)
            }
            None => MatchOutcome::Unmatched,
        }
    }

    /// Match every file, keeping input order.
    ///
    /// A file resolving to a partition already taken by an earlier file
    /// is reported as unmatched.
    pub fn match_files<P: AsRef<Path>>(&self, paths: &[P]) -> MatchReport {
        let mut report = MatchReport::default();
        for path in paths {
            let path = path.as_ref();
            match self.match_file(path) {
                MatchOutcome::Matched(id) => {
                    if report.bindings.iter().any(|b| b.partition_id == id) {
                        warn!(file = %path.display(), id, "Partition already matched");
                        report.unmatched.push(path.to_path_buf());
                    } else {
                        report.bindings.push(FileInfo::new(id, path));
                    }
                }
                MatchOutcome::Skipped => report.skipped.push(lowercase_basename(path)),
                MatchOutcome::Unmatched => report.unmatched.push(path.to_path_buf()),
            }
        }
        report
    }

    fn find_by_flash_filename(&self, base: &str) -> Option<u32> {
        self.pit
            .entries()
            .filter(|e| e.is_flashable())
            .find(|e| {
                let flash = e.flash_filename().to_lowercase();
                !flash.is_empty() && flash.contains(base)
            })
            .map(|e| e.identifier())
    }
}

/// Candidate partition names for a lowercased basename, in lookup order.
pub fn candidate_names(lower: &str) -> Vec<String> {
    let keyword_table: [(bool, &[&str]); 15] = [
        (lower.contains("home_csc"), &["CSC", "ODM", "OMC"]),
        (lower.contains("csc"), &["CSC", "ODM", "OMC"]),
        (
            lower.contains("modem") || lower.starts_with("cp_"),
            &["MODEM", "CP"],
        ),
        (
            lower.contains("bootloader") || lower.contains("sboot"),
            &["SBOOT", "BOOTLOADER"],
        ),
        (
            lower.contains("boot") && !lower.contains("bootloader"),
            &["BOOT"],
        ),
        (lower.contains("recovery"), &["RECOVERY"]),
        (lower.contains("system"), &["SYSTEM"]),
        (lower.contains("vendor"), &["VENDOR"]),
        (lower.contains("product"), &["PRODUCT"]),
        (lower.contains("userdata"), &["USERDATA"]),
        (lower.contains("cache"), &["CACHE"]),
        (lower.contains("dtbo"), &["DTBO"]),
        (
            lower.contains("vbmeta"),
            &["VBMETA_SYSTEM", "VBMETA_VENDOR", "VBMETA"],
        ),
        (lower.contains("param"), &["PARAM"]),
        (lower.contains("cm"), &["CM"]),
    ];

    let mut candidates: Vec<String> = Vec::new();
    for name in keyword_table
        .iter()
        .filter(|(hit, _)| *hit)
        .flat_map(|(_, names)| names.iter())
    {
        if !candidates.iter().any(|c| c == name) {
            candidates.push(name.to_string());
        }
    }

    let literal = strip_extensions(lower).to_uppercase();
    if !candidates.contains(&literal) {
        candidates.push(literal);
    }
    candidates
}

/// Drop up to two trailing extensions (`boot.img.lz4` -> `boot`).
/// A leading dot is not treated as an extension separator.
fn strip_extensions(name: &str) -> &str {
    let mut stem = name;
    for _ in 0..2 {
        if let Some(idx) = stem.rfind('.')
            && idx > 0
        {
            stem = &stem[..idx];
        }
    }
    stem
}

fn lowercase_basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Build firmware from a PIT file and a set of loose images.
///
/// Fails with [`MatchError::NoFilesMatched`] if nothing could be mapped;
/// otherwise unmatched files are dropped with a warning.
pub fn quick_convert<P: AsRef<Path>>(
    pit_path: &Path,
    files: &[P],
) -> Result<FirmwareInfo, MatchError> {
    let pit = read_pit_file(pit_path)?;
    let report = PartitionMatcher::new(&pit).match_files(files);

    for path in &report.unmatched {
        warn!(file = %path.display(), "No partition matched, file dropped");
    }
    if report.bindings.is_empty() {
        return Err(MatchError::NoFilesMatched {
            skipped: report.skipped,
        });
    }

    info!(
        matched = report.bindings.len(),
        skipped = report.skipped.len(),
        "Converted firmware images"
    );

    Ok(FirmwareInfo {
        name: CONVERSION_NAME.to_string(),
        version: Local::now().format("%Y%m%d-%H%M").to_string(),
        platform: PlatformInfo::new("Android", ""),
        pit_filename: pit_path.to_path_buf(),
        repartition: false,
        no_reboot: false,
        files: report.bindings,
        ..FirmwareInfo::default()
    })
}
