//! Atomic filesystem operations.
//!
//! Atomic writes follow the usual pattern: write content to a temporary
//! file in the same directory, fsync, then rename over the target. Rename
//! is atomic on POSIX when source and destination share a filesystem; on
//! Windows we fall back to remove-then-rename for an existing target.
//!
//! `create_exclusive` is the guard for state that must exist at most once:
//! creation with `create_new` loses cleanly to a concurrent creator instead
//! of clobbering its state.

use crate::error::{Result, RevuError};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Atomically write a string to a file, replacing any existing content.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    let path = path.as_ref();

    let parent = path.parent().unwrap_or(Path::new("."));
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RevuError::UserError("invalid file path".to_string()))?;
    let temp_path = parent.join(format!(".{}.tmp", filename));

    write_and_sync(&temp_path, content.as_bytes())?;
    atomic_replace(&temp_path, path)
}

/// Create a file with exclusive-create semantics, failing if it exists.
///
/// The caller owns the error message for the "already exists" case, so the
/// distinction is reported as `Ok(false)` rather than an error.
pub fn create_exclusive<P: AsRef<Path>>(path: P, content: &str) -> Result<bool> {
    let path = path.as_ref();
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(RevuError::UserError(format!(
                "failed to create '{}': {}",
                path.display(),
                e
            )));
        }
    };
    file.write_all(content.as_bytes()).map_err(|e| {
        let _ = fs::remove_file(path);
        RevuError::UserError(format!("failed to write '{}': {}", path.display(), e))
    })?;
    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        RevuError::UserError(format!("failed to sync '{}': {}", path.display(), e))
    })?;
    Ok(true)
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        RevuError::UserError(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;
    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        RevuError::UserError(format!("failed to write temporary file: {}", e))
    })?;
    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        RevuError::UserError(format!("failed to sync temporary file: {}", e))
    })?;
    Ok(())
}

#[cfg(unix)]
fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        RevuError::UserError(format!(
            "failed to atomically replace '{}': {}",
            target.display(),
            e
        ))
    })?;
    // Sync the directory entry as well.
    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
    Ok(())
}

#[cfg(windows)]
fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    if fs::rename(source, target).is_ok() {
        return Ok(());
    }
    // Not atomic, but rename cannot replace an existing file on Windows.
    let _ = fs::remove_file(target);
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        RevuError::UserError(format!(
            "failed to replace '{}': {}",
            target.display(),
            e
        ))
    })
}
