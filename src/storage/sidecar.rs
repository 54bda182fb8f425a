//! Durable sidecar records
//!
//! Backups and restores are described by JSON files stored next to (but
//! separate from) their payloads. A [`SidecarStore`] owns one directory and
//! one file suffix, and provides atomic save, lookup and listing. Listing
//! degrades by omission: a corrupt sidecar is logged and skipped.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;

use super::file_io::{read_json_required, remove_file_if_exists, write_json_atomic};
use crate::error::{BackupError, BackupResult};
use crate::models::{BackupRecord, RestoreRecord};

/// A record that can be persisted as a sidecar file
pub trait SidecarRecord: Serialize + DeserializeOwned + Send + Sync {
    /// File stem the sidecar is stored under
    fn file_stem(&self) -> &str;

    /// Timestamp listings are ordered by, newest first
    fn sort_key(&self) -> DateTime<Utc>;
}

impl SidecarRecord for BackupRecord {
    fn file_stem(&self) -> &str {
        &self.name
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl SidecarRecord for RestoreRecord {
    fn file_stem(&self) -> &str {
        &self.id
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// JSON sidecar files of one record type in one directory
#[derive(Debug, Clone)]
pub struct SidecarStore<T> {
    dir: PathBuf,
    suffix: &'static str,
    _record: PhantomData<fn() -> T>,
}

impl<T: SidecarRecord> SidecarStore<T> {
    /// Create a store for files named `<stem><suffix>` in `dir`
    pub fn new(dir: PathBuf, suffix: &'static str) -> Self {
        Self {
            dir,
            suffix,
            _record: PhantomData,
        }
    }

    /// Directory the sidecars live in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the sidecar for a file stem
    pub fn path_for(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}{}", stem, self.suffix))
    }

    /// Persist a record atomically, replacing any previous version
    pub async fn save(&self, record: &T) -> BackupResult<()> {
        write_json_atomic(self.path_for(record.file_stem()), record).await
    }

    /// Load one record by file stem
    ///
    /// Returns `Ok(None)` when no sidecar exists for the stem.
    pub async fn load(&self, stem: &str) -> BackupResult<Option<T>> {
        let path = self.path_for(stem);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        read_json_required(&path).await.map(Some)
    }

    /// Remove the sidecar for a file stem; returns whether one existed
    pub async fn remove(&self, stem: &str) -> BackupResult<bool> {
        remove_file_if_exists(self.path_for(stem)).await
    }

    /// Read every sidecar in the directory, newest first
    ///
    /// Corrupt or unreadable sidecars are skipped with a warning.
    pub async fn list(&self) -> BackupResult<Vec<T>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BackupError::Io(format!(
                    "Failed to read directory {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut records = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackupError::Io(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            let is_sidecar = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(self.suffix));
            if !is_sidecar {
                continue;
            }

            match read_json_required::<T, _>(&path).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable sidecar");
                }
            }
        }

        records.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));

        Ok(records)
    }
}
