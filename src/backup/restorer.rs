//! Per-component restore
//!
//! A [`ComponentRestorer`] writes one extracted component payload back onto
//! the live layout. Before any live file is written, its current content is
//! copied into the restore's snapshot directory and journalled as a
//! [`RollbackEntry`], so a failed restore can be undone with [`undo`].

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;

use crate::archive::nested_entries;
use crate::config::LiveLayout;
use crate::crypto::checksum;
use crate::error::{BackupError, BackupResult};
use crate::models::{ComponentKind, ComponentRecord, RollbackEntry};
use crate::storage::{remove_file_if_exists, write_bytes_atomic};

/// Everything a restorer needs besides the component itself
#[derive(Debug)]
pub struct RestoreContext<'a> {
    pub layout: &'a LiveLayout,
    /// Directory the outer archive was extracted into
    pub extracted: &'a Path,
    /// Directory pre-restore snapshots are copied into
    pub snapshot_dir: &'a Path,
    /// Replace live files that already exist
    pub overwrite: bool,
    /// Largest decompressed file accepted from a nested archive
    pub max_entry_bytes: u64,
}

/// Restore strategy, one per component kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentRestorer {
    Database,
    Config,
    Cache,
    Files,
}

impl ComponentRestorer {
    pub fn for_kind(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Database => Self::Database,
            ComponentKind::Config => Self::Config,
            ComponentKind::Cache => Self::Cache,
            ComponentKind::Files => Self::Files,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Database => ComponentKind::Database,
            Self::Config => ComponentKind::Config,
            Self::Cache => ComponentKind::Cache,
            Self::Files => ComponentKind::Files,
        }
    }

    /// Restore the component, returning a summary message
    ///
    /// Every live path written is appended to `journal` before it is written.
    /// Errors are reported as [`BackupError::ComponentRestore`].
    pub async fn restore(
        &self,
        ctx: &RestoreContext<'_>,
        expected: &ComponentRecord,
        journal: &mut Vec<RollbackEntry>,
    ) -> BackupResult<String> {
        let kind = self.kind();
        self.run(ctx, expected, journal).await.map_err(|e| match e {
            BackupError::ComponentRestore { .. } => e,
            other => BackupError::component_restore(kind.as_str(), other.to_string()),
        })
    }

    async fn run(
        &self,
        ctx: &RestoreContext<'_>,
        expected: &ComponentRecord,
        journal: &mut Vec<RollbackEntry>,
    ) -> BackupResult<String> {
        let kind = self.kind();
        let payload = read_payload(ctx.extracted, kind).await?;

        let actual = checksum(&payload);
        if !actual.eq_ignore_ascii_case(&expected.checksum) {
            return Err(BackupError::ChecksumMismatch {
                expected: expected.checksum.clone(),
                actual,
            });
        }

        match self {
            Self::Database => restore_database(ctx, payload, journal).await,
            Self::Config | Self::Cache | Self::Files => {
                restore_tree(kind, ctx, payload, journal).await
            }
        }
    }
}

async fn read_payload(extracted: &Path, kind: ComponentKind) -> BackupResult<Vec<u8>> {
    let path = extracted.join(kind.archive_entry());
    fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BackupError::component_restore(
                kind.as_str(),
                format!("{} not found in backup", kind.archive_entry()),
            )
        } else {
            BackupError::component_restore(
                kind.as_str(),
                format!("Failed to read {}: {}", path.display(), e),
            )
        }
    })
}

async fn restore_database(
    ctx: &RestoreContext<'_>,
    payload: Vec<u8>,
    journal: &mut Vec<RollbackEntry>,
) -> BackupResult<String> {
    let target = ctx.layout.database_path();

    if !ctx.overwrite && fs::try_exists(&target).await.unwrap_or(false) {
        let mut aside = target.clone().into_os_string();
        aside.push(format!(".backup.{}", Utc::now().timestamp_millis()));
        let aside = PathBuf::from(aside);

        journal.push(RollbackEntry {
            target: aside.clone(),
            snapshot: None,
        });
        fs::copy(&target, &aside).await.map_err(|e| {
            BackupError::Io(format!("Failed to preserve current database: {}", e))
        })?;
        tracing::info!(path = %aside.display(), "Current database preserved");
    }

    snapshot(&target, ctx.snapshot_dir, journal).await?;
    write_bytes_atomic(&target, &payload).await?;

    Ok("Database restored successfully".to_string())
}

async fn restore_tree(
    kind: ComponentKind,
    ctx: &RestoreContext<'_>,
    payload: Vec<u8>,
    journal: &mut Vec<RollbackEntry>,
) -> BackupResult<String> {
    let limit = ctx.max_entry_bytes;
    let entries = tokio::task::spawn_blocking(move || nested_entries(payload, limit)).await??;

    let mut written = 0usize;
    let mut skipped = 0usize;

    for entry in entries {
        let target = ctx.layout.resolve(&entry.relative);

        if !ctx.overwrite && fs::try_exists(&target).await.unwrap_or(false) {
            tracing::debug!(component = %kind, path = %target.display(), "Existing file kept");
            skipped += 1;
            continue;
        }

        snapshot(&target, ctx.snapshot_dir, journal).await?;
        write_bytes_atomic(&target, &entry.data).await.map_err(|e| {
            BackupError::component_restore(
                kind.as_str(),
                format!("Failed to write {}: {}", entry.name, e),
            )
        })?;
        written += 1;
    }

    Ok(format!(
        "{} restored successfully ({} written, {} skipped)",
        capitalize(kind.as_str()),
        written,
        skipped
    ))
}

/// Journal `target` and copy its current content aside
async fn snapshot(
    target: &Path,
    snapshot_dir: &Path,
    journal: &mut Vec<RollbackEntry>,
) -> BackupResult<()> {
    let metadata = match fs::metadata(target).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            journal.push(RollbackEntry {
                target: target.to_path_buf(),
                snapshot: None,
            });
            return Ok(());
        }
        Err(e) => {
            return Err(BackupError::Io(format!(
                "Failed to inspect {}: {}",
                target.display(),
                e
            )))
        }
    };

    if !metadata.is_file() {
        return Err(BackupError::Io(format!(
            "{} exists and is not a regular file",
            target.display()
        )));
    }

    fs::create_dir_all(snapshot_dir).await.map_err(|e| {
        BackupError::Io(format!("Failed to create snapshot directory: {}", e))
    })?;
    let copy = snapshot_dir.join(format!("{:06}", journal.len()));
    fs::copy(target, &copy).await.map_err(|e| {
        BackupError::Io(format!("Failed to snapshot {}: {}", target.display(), e))
    })?;

    journal.push(RollbackEntry {
        target: target.to_path_buf(),
        snapshot: Some(copy),
    });
    Ok(())
}

/// Replay a rollback journal, newest entry first
///
/// Snapshotted targets get their previous content back; targets that did not
/// exist before the restore are removed.
pub async fn undo(journal: &[RollbackEntry]) -> BackupResult<usize> {
    for entry in journal.iter().rev() {
        match &entry.snapshot {
            Some(copy) => {
                let data = fs::read(copy).await.map_err(|e| {
                    BackupError::Io(format!("Failed to read snapshot {}: {}", copy.display(), e))
                })?;
                write_bytes_atomic(&entry.target, &data).await?;
            }
            None => {
                remove_file_if_exists(&entry.target).await?;
            }
        }
    }
    Ok(journal.len())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
