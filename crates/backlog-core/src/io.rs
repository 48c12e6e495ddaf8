use crate::error::{BacklogError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting caches and reports.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a UTF-8 file, mapping a missing file to `FileNotFound`.
pub fn read_text(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(BacklogError::FileNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = read_text(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Pretty-printed JSON with a trailing newline. Non-ASCII text is kept as-is.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut data = serde_json::to_string_pretty(value)?;
    data.push('\n');
    atomic_write(path, data.as_bytes())
}

/// Write `text` only when it differs from what is on disk. Returns true if written.
pub fn write_if_changed(path: &Path, text: &str) -> Result<bool> {
    if path.exists() && std::fs::read_to_string(path)? == text {
        return Ok(false);
    }
    atomic_write(path, text.as_bytes())?;
    Ok(true)
}
