//! Crash-safe JSON file access.
//!
//! Writes go to a `.tmp` sibling which is fsynced and then renamed over the
//! target, so a reader sees either the previous document or the new one.

use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::PersistenceError;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| PersistenceError::Corrupt(format!("serialization failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PersistenceError::Io(e.to_string()))?;
    }

    let tmp_path = temp_path(path);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| PersistenceError::Io(e.to_string()))?;

    {
        let mut writer = BufWriter::new(&mut file);
        writer.write_all(&json).map_err(|e| PersistenceError::Io(e.to_string()))?;
        writer.flush().map_err(|e| PersistenceError::Io(e.to_string()))?;
    }
    file.sync_all().map_err(|e| PersistenceError::Io(e.to_string()))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        PersistenceError::Io(e.to_string())
    })
}

/// Read and parse a JSON document; a missing file is `NotFound`, bad JSON is `Corrupt`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let bytes = fs::read(path)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(PersistenceError::Corrupt(format!("{} is empty", path.display())));
    }
    Ok(serde_json::from_slice(&bytes)?)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
