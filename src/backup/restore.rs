//! Restore orchestrator
//!
//! Drives a restore attempt through its lifecycle:
//!
//! ```text
//! pending -> validating -> restoring -> completed | failed
//!                       \-> completed (validate only)
//! failed -> rolled_back
//! ```
//!
//! The record is persisted at every transition. Failures of individual
//! components are collected and reported together; anything else aborts the
//! attempt, marks the record failed and is returned to the caller.

use std::path::{Path, PathBuf};

use crate::error::{BackupError, BackupResult};
use crate::locks::{backup_key, live_key, restore_key};
use crate::models::component::join_names;
use crate::models::{
    BackupRecord, ComponentKind, ComponentOutcome, RestoreOptions, RestoreRecord, RestoreStatus,
};
use crate::storage::{remove_dir_if_exists, SidecarStore};

use super::manager::BackupManager;
use super::restorer::{undo, ComponentRestorer, RestoreContext};

/// Suffix of restore record files
const RECORD_SUFFIX: &str = ".json";

/// Handles restoring from backups
#[derive(Debug, Clone)]
pub struct RestoreManager {
    backups: BackupManager,
    store: SidecarStore<RestoreRecord>,
}

impl RestoreManager {
    /// Create a new RestoreManager sharing the backup manager's locks
    pub fn new(backups: BackupManager) -> Self {
        let store = SidecarStore::new(backups.paths().restore_dir(), RECORD_SUFFIX);
        Self { backups, store }
    }

    /// Run a restore attempt
    ///
    /// Returns the final record. A record whose components did not all
    /// restore is returned with status `failed`; errors that abort the whole
    /// attempt are returned as `Err` after the failed record is persisted.
    pub async fn create(&self, options: RestoreOptions) -> BackupResult<RestoreRecord> {
        let mut record = RestoreRecord::pending(&options);
        self.store.save(&record).await?;

        tracing::info!(
            restore_id = %record.id,
            backup_id = %options.backup_id,
            validate_only = options.validate_only,
            "Starting restore"
        );

        match self.run(&mut record, &options).await {
            Ok(()) => {
                self.store.save(&record).await?;
                Ok(record)
            }
            Err(e) => {
                record.fail(e.to_string());
                tracing::error!(restore_id = %record.id, error = %e, "Restore failed");
                if let Err(save_err) = self.store.save(&record).await {
                    tracing::warn!(restore_id = %record.id, error = %save_err, "Failed to persist failed restore record");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, record: &mut RestoreRecord, options: &RestoreOptions) -> BackupResult<()> {
        let backup = self
            .backups
            .get(&options.backup_id)
            .await?
            .ok_or_else(|| BackupError::backup_not_found(&options.backup_id))?;
        record.backup_name = backup.name.clone();

        let components = resolve_components(options.components.as_deref(), &backup)?;

        let mut keys = vec![backup_key(&backup.id)];
        if !options.validate_only {
            keys.extend(components.iter().map(|c| live_key(*c)));
        }
        let _locks = self.backups.locks().acquire(keys).await;

        record.transition(RestoreStatus::Validating)?;
        self.store.save(record).await?;

        let stored = self.backups.read_verified(&backup).await?;
        let validated = self.backups.validate_archive(stored, backup.encrypted).await?;

        record.validated = true;
        self.store.save(record).await?;
        tracing::info!(restore_id = %record.id, "Backup validated");

        if options.validate_only {
            record.transition(RestoreStatus::Completed)?;
            return Ok(());
        }

        let scratch = self.backups.paths().scratch_dir().join(&record.id);
        let outcome = self
            .extract_and_restore(record, &backup, &components, validated, &scratch, options.overwrite)
            .await;

        if let Err(e) = remove_dir_if_exists(&scratch).await {
            tracing::warn!(restore_id = %record.id, error = %e, "Failed to clean up scratch directory");
        }

        outcome
    }

    async fn extract_and_restore(
        &self,
        record: &mut RestoreRecord,
        backup: &BackupRecord,
        components: &[ComponentKind],
        validated: super::manager::ValidatedArchive,
        scratch: &Path,
        overwrite: bool,
    ) -> BackupResult<()> {
        let dir = scratch.to_path_buf();
        let mut contents = validated.into_contents();
        tokio::task::spawn_blocking(move || contents.extract_to(&dir)).await??;

        record.restore_path = Some(scratch.to_path_buf());
        record.transition(RestoreStatus::Restoring)?;
        self.store.save(record).await?;

        let snapshot_dir = self.snapshot_dir(&record.id);
        let ctx = RestoreContext {
            layout: self.backups.paths().layout(),
            extracted: scratch,
            snapshot_dir: &snapshot_dir,
            overwrite,
            max_entry_bytes: self.backups.settings().max_import_bytes,
        };

        for kind in components {
            let outcome = match backup.component(*kind) {
                Some(expected) => {
                    let restorer = ComponentRestorer::for_kind(*kind);
                    match restorer.restore(&ctx, expected, &mut record.rollback).await {
                        Ok(message) => ComponentOutcome::succeeded(*kind, message),
                        Err(e) => {
                            tracing::error!(restore_id = %record.id, component = %kind, error = %e, "Component restore failed");
                            ComponentOutcome::failed(*kind, &e)
                        }
                    }
                }
                None => ComponentOutcome::failed(
                    *kind,
                    &BackupError::component_restore(kind.as_str(), "not present in backup"),
                ),
            };
            record.results.push(outcome);
            self.store.save(record).await?;
        }

        let failed = record.failed_components();
        if failed.is_empty() {
            record.transition(RestoreStatus::Completed)?;
            record.rollback.clear();
            if let Err(e) = remove_dir_if_exists(&snapshot_dir).await {
                tracing::warn!(restore_id = %record.id, error = %e, "Failed to remove rollback snapshots");
            }
            tracing::info!(restore_id = %record.id, "Restore completed");
        } else {
            record.fail(format!("Failed to restore components: {}", join_names(&failed)));
            tracing::warn!(
                restore_id = %record.id,
                failed = %join_names(&failed),
                "Restore completed with errors"
            );
        }

        Ok(())
    }

    fn snapshot_dir(&self, restore_id: &str) -> PathBuf {
        self.backups.paths().rollback_dir().join(restore_id)
    }

    /// List restore attempts, newest first
    pub async fn list(&self) -> BackupResult<Vec<RestoreRecord>> {
        self.store.list().await
    }

    /// Get a restore attempt by id
    pub async fn get(&self, id: &str) -> BackupResult<Option<RestoreRecord>> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Ok(None);
        }
        self.store.load(id).await
    }

    /// Undo the live writes of a failed restore
    ///
    /// Only legal once, and only for restores in the `failed` state.
    pub async fn rollback(&self, id: &str, requester: &str) -> BackupResult<RestoreRecord> {
        let record = self
            .get(id)
            .await?
            .ok_or_else(|| BackupError::restore_not_found(id))?;

        let keys = std::iter::once(restore_key(&record.id))
            .chain(record.results.iter().map(|r| live_key(r.component)));
        let _locks = self.backups.locks().acquire(keys).await;

        // Re-read under the lock in case a concurrent rollback finished first
        let mut record = self
            .get(id)
            .await?
            .ok_or_else(|| BackupError::restore_not_found(id))?;

        if record.status != RestoreStatus::Failed || record.rollback_performed {
            return Err(BackupError::InvalidState(format!(
                "Restore {} is {} and cannot be rolled back",
                record.id, record.status
            )));
        }

        let replayed = undo(&record.rollback).await?;

        let snapshot_dir = self.snapshot_dir(&record.id);
        if let Err(e) = remove_dir_if_exists(&snapshot_dir).await {
            tracing::warn!(restore_id = %record.id, error = %e, "Failed to remove rollback snapshots");
        }

        record.transition(RestoreStatus::RolledBack)?;
        record.rollback_performed = true;
        self.store.save(&record).await?;

        tracing::info!(
            restore_id = %record.id,
            requester = %requester,
            files = replayed,
            "Restore rolled back"
        );

        Ok(record)
    }
}

/// Components a restore will process
///
/// Every requested component must be part of the backup.
fn resolve_components(
    requested: Option<&[ComponentKind]>,
    backup: &BackupRecord,
) -> BackupResult<Vec<ComponentKind>> {
    let available = backup.component_kinds();

    let requested = match requested {
        None | Some([]) => return Ok(available),
        Some(list) => list,
    };

    let missing: Vec<ComponentKind> = requested
        .iter()
        .copied()
        .filter(|c| !available.contains(c))
        .collect();
    if !missing.is_empty() {
        return Err(BackupError::Validation(format!(
            "Components not in backup {}: {}",
            backup.name,
            join_names(&missing)
        )));
    }

    let mut components = Vec::with_capacity(requested.len());
    for kind in requested {
        if !components.contains(kind) {
            components.push(*kind);
        }
    }
    Ok(components)
}
