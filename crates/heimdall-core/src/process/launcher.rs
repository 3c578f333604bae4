//! Starting a tool with a PATH-search fallback.
//!
//! Some desktop environments hand applications a PATH that lacks the
//! directory the tool lives in. When starting the bare program name fails,
//! each PATH directory is tried in turn, with `/usr/local/bin` and
//! `/usr/bin` always among them. The whole search is bounded by an overall
//! deadline.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::traits::{ProcessError, ToolProcess};

/// Directories searched even when missing from PATH.
pub const FALLBACK_DIRS: [&str; 2] = ["/usr/local/bin", "/usr/bin"];

/// Timing limits for a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPolicy {
    /// Wait for each individual start attempt.
    pub start_timeout: Duration,
    /// Bound on the whole search, across all attempts.
    pub deadline: Duration,
}

impl Default for LaunchPolicy {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_millis(3000),
            deadline: Duration::from_millis(15000),
        }
    }
}

/// Fallback directories in search order.
///
/// `/usr/bin` and `/usr/local/bin` are put in front when PATH lacks them.
/// Empty entries are skipped.
pub fn candidate_dirs(path_var: Option<&OsStr>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = path_var
        .map(|p| std::env::split_paths(p).collect())
        .unwrap_or_default();
    dirs.retain(|d| !d.as_os_str().is_empty());

    for fallback in FALLBACK_DIRS {
        if !dirs.iter().any(|d| d == Path::new(fallback)) {
            dirs.insert(0, PathBuf::from(fallback));
        }
    }
    dirs
}

/// Every path `program` is tried under: the name itself, then the name in
/// each candidate directory. A program given with a directory is only tried
/// as-is.
pub fn candidate_programs(program: &Path, path_var: Option<&OsStr>) -> Vec<PathBuf> {
    let mut programs = vec![program.to_path_buf()];
    if program.components().count() == 1 && !program.is_absolute() {
        programs.extend(candidate_dirs(path_var).into_iter().map(|d| d.join(program)));
    }
    programs
}

/// Start `program`, falling back through PATH directories while the start
/// fails.
///
/// Returns the path that started. Errors other than start failures end the
/// search immediately; running past `policy.deadline` ends it with the last
/// start error.
pub fn launch(
    process: &mut dyn ToolProcess,
    program: &Path,
    args: &[String],
    path_var: Option<&OsStr>,
    policy: &LaunchPolicy,
) -> Result<PathBuf, ProcessError> {
    let started = Instant::now();
    let mut last_error = None;

    for candidate in candidate_programs(program, path_var) {
        if started.elapsed() >= policy.deadline {
            warn!(
                program = %program.display(),
                "Launch deadline of {:?} exceeded",
                policy.deadline
            );
            break;
        }

        debug!(candidate = %candidate.display(), "Starting");
        match process.start(&candidate, args, policy.start_timeout) {
            Ok(()) => {
                info!(program = %candidate.display(), "Started {}", args.join(" "));
                return Ok(candidate);
            }
            Err(e) if e.is_start_failure() => {
                debug!(candidate = %candidate.display(), error = %e, "Start failed");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| ProcessError::FailedToStart {
        program: program.display().to_string(),
        reason: "no candidate could be tried".into(),
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::MockProcess;

    #[test]
    fn test_fallback_dirs_prepended() {
        let dirs = candidate_dirs(Some(OsStr::new("/opt/tools::/home/me/bin")));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/usr/bin"),
                PathBuf::from("/usr/local/bin"),
                PathBuf::from("/opt/tools"),
                PathBuf::from("/home/me/bin"),
            ]
        );

        let dirs = candidate_dirs(Some(OsStr::new("/usr/local/bin:/usr/bin:/bin")));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/usr/local/bin"),
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin"),
            ]
        );

        assert_eq!(candidate_dirs(None).len(), 2);
    }

    #[test]
    fn test_candidate_programs() {
        let path = Some(OsStr::new("/bin"));
        assert_eq!(
            candidate_programs(Path::new("heimdall"), path),
            vec![
                PathBuf::from("heimdall"),
                PathBuf::from("/usr/bin/heimdall"),
                PathBuf::from("/usr/local/bin/heimdall"),
                PathBuf::from("/bin/heimdall"),
            ]
        );
        assert_eq!(
            candidate_programs(Path::new("/opt/heimdall"), path),
            vec![PathBuf::from("/opt/heimdall")]
        );
    }

    #[test]
    fn test_launch_stops_at_first_success() {
        let mut mock = MockProcess::new();
        mock.queue_start_failure();
        mock.queue_start_failure();
        mock.queue_exit(&[], 0);

        let started = launch(
            &mut mock,
            Path::new("heimdall"),
            &["detect".into()],
            Some(OsStr::new("/bin")),
            &LaunchPolicy::default(),
        )
        .unwrap();
        assert_eq!(started, PathBuf::from("/usr/local/bin/heimdall"));
        assert_eq!(mock.programs().len(), 3);
    }

    #[test]
    fn test_launch_exhausts_candidates() {
        let mut mock = MockProcess::new();
        let err = launch(
            &mut mock,
            Path::new("heimdall"),
            &[],
            None,
            &LaunchPolicy::default(),
        )
        .unwrap_err();
        assert!(err.is_start_failure());
        assert_eq!(mock.programs().len(), 3);
    }

    #[test]
    fn test_launch_deadline() {
        let mut mock = MockProcess::new();
        let policy = LaunchPolicy {
            start_timeout: Duration::from_millis(10),
            deadline: Duration::ZERO,
        };
        let err = launch(&mut mock, Path::new("heimdall"), &[], None, &policy).unwrap_err();
        assert!(err.is_start_failure());
        assert!(mock.programs().is_empty());
    }
}
