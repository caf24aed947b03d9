use crate::locator;
use anyhow::{Context, Result};
use log::{debug, info};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use zip::ZipArchive;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("illegal file path in archive: {0}")]
    PathTraversal(String),
}

/// Extract every entry of the zip at `src` into `dest`.
///
/// `dest` and any missing parents are created first. Entries whose name
/// resolves outside `dest` abort the extraction; whatever was written before
/// the offending entry stays on disk.
pub fn extract(src: &Path, dest: &Path) -> Result<usize, ExtractError> {
    let file = File::open(src)?;
    let mut archive = ZipArchive::new(file)?;

    fs::create_dir_all(dest)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let target = resolve_entry_path(dest, entry.name())?;

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        // Ensure parent directory exists
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = open_truncated(&target, entry.unix_mode())?;
        io::copy(&mut entry, &mut out)?;
        debug!("Extracted {}", target.display());
    }

    info!(
        "Extracted {} entries from {} into {}",
        archive.len(),
        src.display(),
        dest.display()
    );

    Ok(archive.len())
}

/// Unpack a dashboard export: the outer bundle holds export metadata plus the
/// actual session archive, which lands in `session_dir`.
pub fn unpack_export(bundle: &Path, session_dir: &Path) -> Result<PathBuf> {
    let staging = tempfile::Builder::new()
        .prefix("session-export")
        .tempdir()
        .context("Failed to create staging directory")?;

    // Outer bundle: export metadata plus the session archive
    extract(bundle, staging.path())
        .with_context(|| format!("Failed to extract export bundle: {}", bundle.display()))?;

    let inner = locator::find_inner_archive(staging.path())?;
    info!("Found session archive: {}", inner.display());

    // Session archive goes to its permanent home
    extract(&inner, session_dir)
        .with_context(|| format!("Failed to extract session archive: {}", inner.display()))?;

    Ok(session_dir.to_path_buf())
}

/// Join `name` onto `root` lexically, refusing anything that would climb out
/// of `root` or that names `root` itself.
fn resolve_entry_path(root: &Path, name: &str) -> Result<PathBuf, ExtractError> {
    let mut relative = PathBuf::new();

    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return Err(ExtractError::PathTraversal(name.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::PathTraversal(name.to_string()));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(ExtractError::PathTraversal(name.to_string()));
    }

    Ok(root.join(relative))
}

#[cfg(unix)]
fn open_truncated(path: &Path, mode: Option<u32>) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if let Some(mode) = mode {
        options.mode(mode & 0o7777);
    }
    options.open(path)
}

#[cfg(not(unix))]
fn open_truncated(path: &Path, _mode: Option<u32>) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
