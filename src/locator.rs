use log::{debug, warn};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Log file names tried in order, two directory levels under the session root.
const LOG_PATTERNS: [&str; 2] = ["*/*/logcat.txt", "*/*/android_app_logcat.txt"];

const SCREENSHOT_PATTERN: &str = "*/*/fbsnapshots/*.jpg";

const INNER_ARCHIVE_PATTERNS: [&str; 2] = ["*/*.zip", "**/*.zip"];

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("Log file not found under {0}")]
    LogNotFound(PathBuf),

    #[error("No session archive found inside export bundle at {0}")]
    InnerArchiveNotFound(PathBuf),

    #[error("Screenshot file name has no numeric timestamp: {0}")]
    BadScreenshotName(PathBuf),

    #[error("invalid search pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// A screenshot on disk together with the capture time encoded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotFile {
    pub path: PathBuf,
    pub captured_at: u64,
}

/// Find the session's log file. When several files match a pattern, the
/// first in sorted path order wins.
pub fn find_log_file(session_root: &Path) -> Result<PathBuf, LocateError> {
    for pattern in LOG_PATTERNS {
        let matches = glob_under(session_root, pattern)?;
        if matches.len() > 1 {
            warn!(
                "{} files match {}, using {}",
                matches.len(),
                pattern,
                matches[0].display()
            );
        }
        if let Some(path) = matches.into_iter().next() {
            return Ok(path);
        }
    }

    Err(LocateError::LogNotFound(session_root.to_path_buf()))
}

/// List the session's screenshots. An empty list is a valid result.
pub fn find_screenshots(session_root: &Path) -> Result<Vec<ScreenshotFile>, LocateError> {
    glob_under(session_root, SCREENSHOT_PATTERN)?
        .into_iter()
        .map(|path| {
            let captured_at = capture_timestamp(&path)
                .ok_or_else(|| LocateError::BadScreenshotName(path.clone()))?;
            Ok(ScreenshotFile { path, captured_at })
        })
        .collect()
}

/// Find the session archive wrapped inside an extracted export bundle.
pub fn find_inner_archive(bundle_root: &Path) -> Result<PathBuf, LocateError> {
    for pattern in INNER_ARCHIVE_PATTERNS {
        if let Some(path) = glob_under(bundle_root, pattern)?.into_iter().next() {
            return Ok(path);
        }
    }

    Err(LocateError::InnerArchiveNotFound(bundle_root.to_path_buf()))
}

/// `1700000000123.jpg` -> `1700000000123`
fn capture_timestamp(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

fn glob_under(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, LocateError> {
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        pattern
    );

    let mut matches = Vec::new();
    for entry in glob::glob(&full)? {
        match entry {
            Ok(path) if path.is_file() => matches.push(path),
            Ok(_) => {}
            Err(e) => debug!("Skipping unreadable path while searching {}: {}", full, e),
        }
    }
    matches.sort();

    Ok(matches)
}
