//! Backup orchestrator
//!
//! Creates, lists, deletes and expires backup archives. A backup is stored as
//! `<name>.backup` next to its `<name>.metadata.json` sidecar; only completed
//! backups ever get a sidecar, so listing never surfaces partial work.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::archive::{assemble, serialize, ArchiveContents, SerializedComponent};
use crate::config::{BackupPaths, BackupSettings};
use crate::crypto::{self, checksum};
use crate::error::{BackupError, BackupResult};
use crate::locks::{archive_key, backup_key, live_key, ResourceLocks};
use crate::models::{
    BackupKind, BackupOptions, BackupRecord, BackupStatus, ComponentKind, ComponentRecord,
    Retention,
};
use crate::storage::{remove_file_if_exists, write_bytes_atomic, SidecarStore};

/// Suffix of backup sidecar files
const SIDECAR_SUFFIX: &str = ".metadata.json";

/// Extension uploaded archives must carry
const ARCHIVE_EXTENSION: &str = ".backup";

/// A decrypted archive that passed structural validation
///
/// Restore extracts from this directly so an encrypted archive is decrypted
/// exactly once.
pub struct ValidatedArchive {
    contents: ArchiveContents,
    encrypted: bool,
}

impl ValidatedArchive {
    /// Entry names in archive order
    pub fn entry_names(&self) -> &[String] {
        self.contents.entry_names()
    }

    /// Components present in the archive
    pub fn components(&self) -> Vec<ComponentKind> {
        self.contents.components()
    }

    /// Whether the stored bytes were encrypted
    pub fn was_encrypted(&self) -> bool {
        self.encrypted
    }

    /// The backup record embedded in the archive
    pub fn metadata(&mut self) -> BackupResult<BackupRecord> {
        self.contents.read_metadata()
    }

    /// Give up validation state and keep the parsed archive
    pub fn into_contents(self) -> ArchiveContents {
        self.contents
    }
}

/// Manages backup creation, storage and retention
#[derive(Debug, Clone)]
pub struct BackupManager {
    paths: BackupPaths,
    settings: BackupSettings,
    store: SidecarStore<BackupRecord>,
    locks: Arc<ResourceLocks>,
}

impl BackupManager {
    /// Create a new BackupManager
    pub fn new(paths: BackupPaths, settings: BackupSettings) -> Self {
        let store = SidecarStore::new(paths.archive_dir(), SIDECAR_SUFFIX);
        Self {
            paths,
            settings,
            store,
            locks: Arc::new(ResourceLocks::new()),
        }
    }

    /// Create a manager with paths and settings resolved from the environment
    pub async fn from_env() -> BackupResult<Self> {
        let paths = BackupPaths::new()?;
        let settings = BackupSettings::load_or_create(&paths).await?;
        Ok(Self::new(paths, settings))
    }

    pub fn paths(&self) -> &BackupPaths {
        &self.paths
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }

    pub(crate) fn locks(&self) -> &Arc<ResourceLocks> {
        &self.locks
    }

    /// Create a backup
    ///
    /// Returns the completed record. On failure nothing is left behind in the
    /// archive directory and the error is returned unchanged.
    pub async fn create(&self, options: BackupOptions) -> BackupResult<BackupRecord> {
        let components = options.effective_components()?;

        let retention_days = options
            .retention_days
            .unwrap_or(self.settings.default_retention_days);
        BackupSettings::validate_retention(retention_days)?;

        let key = if options.encrypt {
            Some(self.settings.encryption_key()?)
        } else {
            None
        };

        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let name = match &options.name {
            Some(name) => {
                validate_name(name)?;
                name.clone()
            }
            None => format!("backup-{}-{}", created_at.format("%Y-%m-%d"), &id[..8]),
        };

        let _locks = self
            .locks
            .acquire(
                std::iter::once(archive_key(&name))
                    .chain(components.iter().map(|c| live_key(*c))),
            )
            .await;

        self.ensure_name_available(&name).await?;

        let mut record = BackupRecord::running(id, name, &options, created_at, retention_days);

        tracing::info!(
            backup_id = %record.id,
            name = %record.name,
            kind = %record.kind,
            components = %crate::models::component::join_names(&components),
            "Starting backup"
        );

        match self.write_backup(&mut record, &components, key.as_ref()).await {
            Ok(()) => {
                tracing::info!(
                    backup_id = %record.id,
                    size = record.size,
                    "Backup completed"
                );
                Ok(record)
            }
            Err(e) => {
                record.mark_failed(e.to_string());
                tracing::error!(backup_id = %record.id, error = %e, "Backup failed");
                self.discard_partial(&record.name).await;
                Err(e)
            }
        }
    }

    async fn write_backup(
        &self,
        record: &mut BackupRecord,
        components: &[ComponentKind],
        key: Option<&crypto::EncryptionKey>,
    ) -> BackupResult<()> {
        let layout = self.paths.layout();

        let mut serialized: Vec<SerializedComponent> = Vec::with_capacity(components.len());
        for kind in components {
            serialized.push(serialize(*kind, layout, record.compressed).await?);
        }
        record.components = serialized.iter().map(SerializedComponent::record).collect();

        let metadata = record.clone();
        let compress = record.compressed;
        let archive = tokio::task::spawn_blocking(move || {
            let parts: Vec<(ComponentKind, &[u8])> = serialized
                .iter()
                .map(|c| (c.kind, c.bytes.as_slice()))
                .collect();
            assemble(&parts, &metadata, compress)
        })
        .await??;

        let stored = match key {
            Some(key) => {
                let key = key.clone();
                tokio::task::spawn_blocking(move || crypto::encrypt(&archive, &key)).await??
            }
            None => archive,
        };

        record.checksum = checksum(&stored);
        record.size = stored.len() as u64;

        write_bytes_atomic(self.paths.archive_file(&record.name), &stored).await?;

        record.status = BackupStatus::Completed;
        self.store.save(record).await
    }

    /// Remove whatever a failed backup may have written
    async fn discard_partial(&self, name: &str) {
        let archive = self.paths.archive_file(name);
        let targets = [
            crate::storage::file_io::temp_path_for(&archive),
            archive,
            crate::storage::file_io::temp_path_for(&self.store.path_for(name)),
        ];
        for path in targets {
            if let Err(e) = remove_file_if_exists(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial backup file");
            }
        }
        if let Err(e) = self.store.remove(name).await {
            tracing::warn!(name = %name, error = %e, "Failed to remove partial backup sidecar");
        }
    }

    async fn ensure_name_available(&self, name: &str) -> BackupResult<()> {
        let taken = self.store.load(name).await.ok().flatten().is_some()
            || tokio::fs::try_exists(self.paths.archive_file(name))
                .await
                .unwrap_or(false);
        if taken {
            return Err(BackupError::Duplicate {
                entity_type: "Backup",
                identifier: name.to_string(),
            });
        }
        Ok(())
    }

    /// List completed backups, newest first
    pub async fn list(&self) -> BackupResult<Vec<BackupRecord>> {
        let records = self.store.list().await?;
        Ok(records.into_iter().filter(BackupRecord::is_completed).collect())
    }

    /// Get a backup by id
    pub async fn get(&self, id: &str) -> BackupResult<Option<BackupRecord>> {
        Ok(self.list().await?.into_iter().find(|b| b.id == id))
    }

    async fn require(&self, id: &str) -> BackupResult<BackupRecord> {
        self.get(id)
            .await?
            .ok_or_else(|| BackupError::backup_not_found(id))
    }

    /// Delete a backup's archive and sidecar
    pub async fn delete(&self, id: &str) -> BackupResult<()> {
        let record = self.require(id).await?;
        let _lock = self.locks.acquire([backup_key(&record.id)]).await;

        self.delete_files(&record).await?;
        tracing::info!(backup_id = %record.id, name = %record.name, "Backup deleted");
        Ok(())
    }

    /// Remove the sidecar first so a half-finished delete never lists a
    /// backup whose archive is gone
    async fn delete_files(&self, record: &BackupRecord) -> BackupResult<()> {
        self.store.remove(&record.name).await?;
        remove_file_if_exists(self.paths.archive_file(&record.name)).await?;
        Ok(())
    }

    /// Delete every backup whose retention has expired
    ///
    /// Returns how many backups were removed. A failure on one backup is
    /// logged and does not stop the sweep.
    pub async fn cleanup(&self) -> BackupResult<usize> {
        let now = Utc::now();
        let mut removed = 0;

        for record in self.list().await? {
            if !record.retention.is_expired(now) {
                continue;
            }

            let _lock = self.locks.acquire([backup_key(&record.id)]).await;
            match self.delete_files(&record).await {
                Ok(()) => {
                    removed += 1;
                    tracing::info!(backup_id = %record.id, name = %record.name, "Expired backup removed");
                }
                Err(e) => {
                    tracing::warn!(backup_id = %record.id, error = %e, "Failed to remove expired backup");
                }
            }
        }

        Ok(removed)
    }

    /// Decrypt (when `encrypted`) and structurally validate archive bytes
    pub async fn validate_archive(
        &self,
        bytes: Vec<u8>,
        encrypted: bool,
    ) -> BackupResult<ValidatedArchive> {
        let key = if encrypted {
            Some(self.settings.encryption_key()?)
        } else {
            None
        };

        let max_entry_bytes = self.settings.max_import_bytes;
        let contents = tokio::task::spawn_blocking(move || {
            let plaintext = match key {
                Some(key) => crypto::decrypt(&bytes, &key)?,
                None => bytes,
            };
            ArchiveContents::parse_validated(plaintext)
                .map(|contents| contents.with_entry_limit(max_entry_bytes))
        })
        .await??;

        Ok(ValidatedArchive {
            contents,
            encrypted,
        })
    }

    /// Read a backup's stored bytes after verifying them against the sidecar
    pub async fn read_archive(&self, id: &str) -> BackupResult<(BackupRecord, Vec<u8>)> {
        let record = self.require(id).await?;
        let _lock = self.locks.acquire([backup_key(&record.id)]).await;

        let bytes = self.read_verified(&record).await?;
        Ok((record, bytes))
    }

    /// Read stored archive bytes and check the whole-archive checksum
    ///
    /// Callers hold the `backup:<id>` lock.
    pub(crate) async fn read_verified(&self, record: &BackupRecord) -> BackupResult<Vec<u8>> {
        let path = self.paths.archive_file(&record.name);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackupError::Storage(format!("Backup file missing: {}", path.display()))
            } else {
                BackupError::Io(format!("Failed to read {}: {}", path.display(), e))
            }
        })?;

        let actual = checksum(&bytes);
        if !actual.eq_ignore_ascii_case(&record.checksum) {
            tracing::error!(backup_id = %record.id, "Stored archive does not match its checksum");
            return Err(BackupError::ChecksumMismatch {
                expected: record.checksum.clone(),
                actual,
            });
        }

        Ok(bytes)
    }

    /// Register an externally produced archive
    ///
    /// The file name must end in `.backup`. The bytes are tried as an
    /// archive encrypted with the configured key first, then as plaintext.
    pub async fn import_archive(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        requester: &str,
    ) -> BackupResult<BackupRecord> {
        let stem = file_name
            .strip_suffix(ARCHIVE_EXTENSION)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                BackupError::Validation(
                    "Invalid file type. Only .backup files are allowed".to_string(),
                )
            })?;
        validate_name(stem)?;

        let size = bytes.len() as u64;
        if size > self.settings.max_import_bytes {
            return Err(BackupError::Validation(format!(
                "File too large: {} bytes exceeds the {} byte limit",
                size, self.settings.max_import_bytes
            )));
        }

        let mut validated = self.open_upload(&bytes).await?;

        let now = Utc::now();
        let embedded = validated.metadata().ok();
        let components = match &embedded {
            Some(metadata) if !metadata.components.is_empty() => metadata.components.clone(),
            _ => component_records_from_entries(&mut validated.contents)?,
        };

        let record = BackupRecord {
            id: format!("uploaded-{}", now.timestamp_millis()),
            name: format!("{}-uploaded-{}", stem, now.format("%Y-%m-%d")),
            kind: BackupKind::Uploaded,
            size,
            compressed: embedded.as_ref().map_or(true, |m| m.compressed),
            encrypted: validated.was_encrypted(),
            checksum: checksum(&bytes),
            created_at: now,
            created_by: requester.to_string(),
            components,
            retention: Retention::days_from(now, self.settings.default_retention_days),
            status: BackupStatus::Completed,
            error_message: None,
            original_file_name: Some(file_name.to_string()),
        };

        let _lock = self.locks.acquire([archive_key(&record.name)]).await;
        self.ensure_name_available(&record.name).await?;

        write_bytes_atomic(self.paths.archive_file(&record.name), &bytes).await?;
        if let Err(e) = self.store.save(&record).await {
            self.discard_partial(&record.name).await;
            return Err(e);
        }

        tracing::info!(
            backup_id = %record.id,
            name = %record.name,
            encrypted = record.encrypted,
            "Uploaded backup registered"
        );

        Ok(record)
    }

    async fn open_upload(&self, bytes: &[u8]) -> BackupResult<ValidatedArchive> {
        if self.settings.encryption_key().is_ok() {
            match self.validate_archive(bytes.to_vec(), true).await {
                Ok(validated) => return Ok(validated),
                Err(e) => {
                    tracing::debug!(error = %e, "Upload is not an encrypted archive, trying plaintext");
                }
            }
        }
        self.validate_archive(bytes.to_vec(), false).await
    }
}

/// Check that a backup name is usable as a single file stem
pub fn validate_name(name: &str) -> BackupResult<()> {
    let invalid = name.trim().is_empty()
        || name.starts_with('.')
        || name.chars().any(|c| c == '/' || c == '\\' || c.is_control())
        || Path::new(name).file_name().map_or(true, |n| n != name);

    if invalid {
        return Err(BackupError::Validation(format!(
            "Invalid backup name: {:?}",
            name
        )));
    }
    Ok(())
}

fn component_records_from_entries(contents: &mut ArchiveContents) -> BackupResult<Vec<ComponentRecord>> {
    let mut records = Vec::new();
    for kind in contents.components() {
        let data = contents.read_entry(kind.archive_entry())?;
        records.push(ComponentRecord {
            name: kind.as_str().to_string(),
            kind,
            size: data.len() as u64,
            checksum: checksum(&data),
        });
    }
    Ok(records)
}
