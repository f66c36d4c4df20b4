use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs::create_dir_all(p)
        .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", p.display())))
}

/// Fails with a precondition error unless `p` is an existing regular file we can open for writing.
pub fn require_writable_file(p: &Path) -> Result<()> {
    let meta = fs::metadata(p)
        .map_err(|e| Error::precondition(format!("{} is not accessible: {e}", p.display())))?;
    if !meta.is_file() {
        return Err(Error::precondition(format!(
            "{} is not a regular file",
            p.display()
        )));
    }
    fs::OpenOptions::new()
        .append(true)
        .open(p)
        .map_err(|e| Error::precondition(format!("{} is not writable: {e}", p.display())))?;
    Ok(())
}

pub fn read_text(p: &Path) -> Result<String> {
    fs::read_to_string(p).map_err(|e| Error::msg(format!("failed to read {}: {e}", p.display())))
}

/// Returns `None` when the file does not exist.
pub fn read_text_opt(p: &Path) -> Result<Option<String>> {
    match fs::read_to_string(p) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::msg(format!("failed to read {}: {e}", p.display()))),
    }
}

/// Writes `contents` to a temp file next to `p`, then renames it over `p`.
///
/// Readers see either the old or the new content, never a mix. When `p` already
/// exists its permission bits are carried over to the replacement.
pub fn write_atomic(p: &Path, contents: &[u8]) -> Result<()> {
    let dir = p
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = p.file_name().and_then(|s| s.to_str()).unwrap_or("file");

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| {
            Error::msg(format!(
                "failed to create temp file in {}: {e}",
                dir.display()
            ))
        })?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::msg(format!("failed to write {}: {e}", tmp.path().display())))?;

    if let Ok(meta) = fs::metadata(p) {
        fs::set_permissions(tmp.path(), meta.permissions()).map_err(|e| {
            Error::msg(format!(
                "failed to copy permissions of {}: {e}",
                p.display()
            ))
        })?;
    }

    tmp.persist(p)
        .map_err(|e| Error::msg(format!("failed to replace {}: {}", p.display(), e.error)))?;
    Ok(())
}

pub fn write_text(p: &Path, s: &str) -> Result<()> {
    if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    write_atomic(p, s.as_bytes())
}

/// Creates `p` as an empty file if missing. Existing content is left alone.
pub fn touch(p: &Path) -> Result<()> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(p)
        .map_err(|e| Error::msg(format!("failed to create {}: {e}", p.display())))?;
    Ok(())
}

/// Returns whether something was removed.
pub fn remove_file_if_exists(p: &Path) -> Result<bool> {
    match fs::remove_file(p) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::msg(format!("failed to remove {}: {e}", p.display()))),
    }
}
