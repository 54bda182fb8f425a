//! File I/O utilities with atomic writes
//!
//! Provides safe file operations that won't corrupt data on failure. Every
//! write goes to a temporary sibling first, is synced to disk, and is then
//! renamed into place, so readers only ever observe complete files.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::BackupError;

/// Temporary sibling used while writing `path`
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("data"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read JSON from a file, returning an error if file doesn't exist
pub async fn read_json_required<T, P>(path: P) -> Result<T, BackupError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let contents = fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BackupError::Storage(format!("File not found: {}", path.display()))
        } else {
            BackupError::Storage(format!("Failed to open {}: {}", path.display(), e))
        }
    })?;

    serde_json::from_slice(&contents)
        .map_err(|e| BackupError::Storage(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write bytes to a file atomically (write to temp, sync, then rename)
pub async fn write_bytes_atomic<P>(path: P, data: &[u8]) -> Result<(), BackupError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            BackupError::Storage(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    // Temp file in same directory (important for atomic rename)
    let temp_path = temp_path_for(path);

    if let Err(e) = write_and_sync(&temp_path, data).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, path).await {
        // Try to clean up temp file if rename fails
        let _ = fs::remove_file(&temp_path).await;
        return Err(BackupError::Storage(format!(
            "Failed to rename temp file: {}",
            e
        )));
    }

    Ok(())
}

async fn write_and_sync(path: &Path, data: &[u8]) -> Result<(), BackupError> {
    let mut file = File::create(path)
        .await
        .map_err(|e| BackupError::Storage(format!("Failed to create temp file: {}", e)))?;

    file.write_all(data)
        .await
        .map_err(|e| BackupError::Storage(format!("Failed to write data: {}", e)))?;

    file.flush()
        .await
        .map_err(|e| BackupError::Storage(format!("Failed to flush data: {}", e)))?;

    // Sync to disk before rename
    file.sync_all()
        .await
        .map_err(|e| BackupError::Storage(format!("Failed to sync data: {}", e)))?;

    Ok(())
}

/// Write JSON to a file atomically
pub async fn write_json_atomic<T, P>(path: P, data: &T) -> Result<(), BackupError>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let json = serde_json::to_vec_pretty(data)
        .map_err(|e| BackupError::Storage(format!("Failed to serialize data: {}", e)))?;
    write_bytes_atomic(path, &json).await
}

/// Remove a file, treating an already-missing file as success
///
/// Returns whether a file was actually removed.
pub async fn remove_file_if_exists<P: AsRef<Path>>(path: P) -> Result<bool, BackupError> {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BackupError::Io(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Remove a directory tree, treating an already-missing directory as success
pub async fn remove_dir_if_exists<P: AsRef<Path>>(path: P) -> Result<(), BackupError> {
    let path = path.as_ref();
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackupError::Io(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}
