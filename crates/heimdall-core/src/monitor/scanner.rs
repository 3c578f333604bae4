//! Incremental scanner for the flashing tool's output stream.
//!
//! Output arrives in arbitrary chunks, so upload-status lines and
//! percentage markers may be split across reads. The scanner keeps only the
//! unterminated tail of the stream (everything after the last `\n` or `%`)
//! and scans that tail together with each new chunk.

/// Prefix of an upload-status line.
const STATUS_MARKER: &[u8] = b"Uploading ";

/// Prefix the flashing tool puts in front of error messages.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Upper bound on retained carry-over.
const MAX_CARRY: usize = 4096;

/// What one chunk of output changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanUpdate {
    /// Most recent complete `Uploading ...` line, without its newline.
    pub status: Option<String>,
    /// Most recent percentage, clamped to 0..=100.
    pub progress: Option<u8>,
    /// Most recent complete line starting with `ERROR: `, prefix included.
    pub error: Option<String>,
    /// The chunk as it should be displayed: backspaces removed, each `%`
    /// followed by a line break.
    pub display: String,
}

#[derive(Debug, Default)]
pub struct OutputScanner {
    carry: Vec<u8>,
}

impl OutputScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> ScanUpdate {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(chunk);

        let update = ScanUpdate {
            status: last_status(&buf),
            progress: last_percent(&buf),
            error: last_error(&buf),
            display: display_text(chunk),
        };
        self.carry = unterminated_tail(&buf);
        update
    }

    pub fn reset(&mut self) {
        self.carry.clear();
    }
}

/// Last complete line holding `Uploading <something>`.
fn last_status(buf: &[u8]) -> Option<String> {
    let end = buf.iter().rposition(|&b| b == b'\n')?;
    buf[..end]
        .split(|&b| b == b'\n')
        .rev()
        .find_map(status_in_line)
}

fn status_in_line(line: &[u8]) -> Option<String> {
    line.windows(STATUS_MARKER.len())
        .enumerate()
        .rev()
        .filter(|(_, window)| *window == STATUS_MARKER)
        .map(|(start, _)| start)
        .find(|&start| line.len() > start + STATUS_MARKER.len())
        .map(|start| String::from_utf8_lossy(&line[start..]).into_owned())
}

/// Last complete line starting with [`ERROR_PREFIX`].
fn last_error(buf: &[u8]) -> Option<String> {
    let end = buf.iter().rposition(|&b| b == b'\n')?;
    buf[..end]
        .split(|&b| b == b'\n')
        .rev()
        .map(|line| String::from_utf8_lossy(line).replace('\x08', ""))
        .map(|line| line.trim().to_string())
        .find(|line| line.starts_with(ERROR_PREFIX))
}

/// Last `<\b or \n><digits>%` marker.
fn last_percent(buf: &[u8]) -> Option<u8> {
    buf.iter()
        .enumerate()
        .rev()
        .filter(|&(_, &b)| b == b'%')
        .find_map(|(end, _)| {
            let digits_start = buf[..end]
                .iter()
                .rposition(|b| !b.is_ascii_digit())
                .map_or(0, |i| i + 1);
            if digits_start == end || digits_start == 0 {
                return None;
            }
            if !matches!(buf[digits_start - 1], b'\x08' | b'\n') {
                return None;
            }
            let value = std::str::from_utf8(&buf[digits_start..end])
                .ok()?
                .parse::<u32>()
                .unwrap_or(u32::MAX);
            Some(value.min(100) as u8)
        })
}

/// Bytes after the last consumed delimiter.
///
/// A trailing `\n` is kept because it may open the next percentage marker.
fn unterminated_tail(buf: &[u8]) -> Vec<u8> {
    let newline = buf.iter().rposition(|&b| b == b'\n');
    let percent = buf.iter().rposition(|&b| b == b'%').map(|i| i + 1);
    let cut = newline.max(percent).unwrap_or(0);

    let tail = &buf[cut..];
    let keep = tail.len().min(MAX_CARRY);
    tail[tail.len() - keep..].to_vec()
}

fn display_text(chunk: &[u8]) -> String {
    String::from_utf8_lossy(chunk)
        .replace('\x08', "")
        .replace('%', "%\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_progress_in_one_chunk() {
        let mut scanner = OutputScanner::new();
        let update = scanner.feed(b"Uploading BOOT\n\x0842%");
        assert_eq!(update.status.as_deref(), Some("Uploading BOOT"));
        assert_eq!(update.progress, Some(42));
        assert_eq!(update.display, "Uploading BOOT\n42%\n");
    }

    #[test]
    fn test_last_match_wins() {
        let mut scanner = OutputScanner::new();
        let update =
            scanner.feed(b"Uploading BOOT\n\x08\x08 1%\x08\x08\x0810%\nUploading RECOVERY\n\n55%");
        assert_eq!(update.status.as_deref(), Some("Uploading RECOVERY"));
        assert_eq!(update.progress, Some(55));
    }

    #[test]
    fn test_split_tokens_are_carried() {
        let mut scanner = OutputScanner::new();

        let first = scanner.feed(b"Uploading SYS");
        assert_eq!(first.status, None);

        let second = scanner.feed(b"TEM\n\x087");
        assert_eq!(second.status.as_deref(), Some("Uploading SYSTEM"));
        assert_eq!(second.progress, None);

        let third = scanner.feed(b"3%");
        assert_eq!(third.status, None);
        assert_eq!(third.progress, Some(73));

        // Already consumed markers are not reported again.
        let fourth = scanner.feed(b"\x08");
        assert_eq!(fourth, ScanUpdate {
            display: String::new(),
            ..ScanUpdate::default()
        });
    }

    #[test]
    fn test_newline_delimiter_is_carried() {
        let mut scanner = OutputScanner::new();
        scanner.feed(b"Uploading PARAM\n");
        let update = scanner.feed(b"100%");
        assert_eq!(update.progress, Some(100));
        assert_eq!(update.status, None);
    }

    #[test]
    fn test_percent_needs_delimiter() {
        let mut scanner = OutputScanner::new();
        assert_eq!(scanner.feed(b"ratio 50%").progress, None);
        assert_eq!(scanner.feed(b"%").progress, None);
        assert_eq!(scanner.feed(b"\n999%").progress, Some(100));
    }

    #[test]
    fn test_status_requires_text() {
        let mut scanner = OutputScanner::new();
        assert_eq!(scanner.feed(b"Uploading \n").status, None);
        assert_eq!(
            scanner.feed(b"Done. Uploading CACHE\n").status.as_deref(),
            Some("Uploading CACHE")
        );
    }

    #[test]
    fn test_error_line_needs_completion() {
        let mut scanner = OutputScanner::new();
        assert_eq!(scanner.feed(b"Beginning session...\nERROR: Claiming ").error, None);
        assert_eq!(
            scanner.feed(b"interface failed!\nReleasing device interface...\n").error.as_deref(),
            Some("ERROR: Claiming interface failed!")
        );
        assert_eq!(scanner.feed(b"Re-attaching kernel driver...\n").error, None);
    }
}
