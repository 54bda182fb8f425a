//! Backup records
//!
//! A [`BackupRecord`] describes one archive on disk. It is embedded in the
//! archive as `metadata.json` and persisted as the authoritative
//! `<name>.metadata.json` sidecar once the archive is complete.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::component::ComponentKind;
use crate::error::{BackupError, BackupResult};

/// Kind of backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// Every component
    Full,
    /// An explicit subset of components
    Partial,
    /// Reserved; never produced
    Incremental,
    /// An externally produced archive registered through import
    Uploaded,
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Incremental => write!(f, "incremental"),
            Self::Uploaded => write!(f, "uploaded"),
        }
    }
}

/// Lifecycle status of a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Integrity record for one component payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Component name
    pub name: String,
    /// Component kind
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    /// Payload size in bytes
    pub size: u64,
    /// SHA-256 of the payload, computed before any archive encryption
    pub checksum: String,
}

/// When a backup becomes eligible for automatic deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    /// Keep the backup at least until this instant
    pub keep_until: DateTime<Utc>,
    /// Whether cleanup may delete the backup after `keep_until`
    pub auto_delete: bool,
}

impl Retention {
    /// Retain for `days` from `from`, eligible for automatic deletion
    pub fn days_from(from: DateTime<Utc>, days: u32) -> Self {
        Self {
            keep_until: from + Duration::days(i64::from(days)),
            auto_delete: true,
        }
    }

    /// Whether cleanup should delete the backup at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.auto_delete && self.keep_until < now
    }
}

/// Metadata describing one backup archive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    /// Opaque unique identifier
    pub id: String,
    /// Human-readable name, also the archive file stem
    pub name: String,
    /// Backup kind
    #[serde(rename = "type")]
    pub kind: BackupKind,
    /// Size of the stored archive in bytes
    pub size: u64,
    /// Whether archive entries are deflated
    pub compressed: bool,
    /// Whether the stored archive is encrypted
    pub encrypted: bool,
    /// SHA-256 of the stored (possibly encrypted) archive
    pub checksum: String,
    /// When the backup was created
    pub created_at: DateTime<Utc>,
    /// Who requested the backup
    pub created_by: String,
    /// Components in archive order
    pub components: Vec<ComponentRecord>,
    /// Retention policy
    pub retention: Retention,
    /// Lifecycle status
    pub status: BackupStatus,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Uploaded file name, for imported archives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
}

impl BackupRecord {
    /// Start a new record in the `running` state
    pub fn running(
        id: String,
        name: String,
        options: &BackupOptions,
        created_at: DateTime<Utc>,
        retention_days: u32,
    ) -> Self {
        Self {
            id,
            name,
            kind: options.kind,
            size: 0,
            compressed: options.compress,
            encrypted: options.encrypt,
            checksum: String::new(),
            created_at,
            created_by: options.requester.clone(),
            components: Vec::new(),
            retention: Retention::days_from(created_at, retention_days),
            status: BackupStatus::Running,
            error_message: None,
            original_file_name: None,
        }
    }

    /// Component kinds contained in the archive, in archive order
    pub fn component_kinds(&self) -> Vec<ComponentKind> {
        self.components.iter().map(|c| c.kind).collect()
    }

    /// Find the record for one component
    pub fn component(&self, kind: ComponentKind) -> Option<&ComponentRecord> {
        self.components.iter().find(|c| c.kind == kind)
    }

    /// Mark the record as failed with a reason
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = BackupStatus::Failed;
        self.error_message = Some(message.into());
    }

    /// Check if the backup completed
    pub fn is_completed(&self) -> bool {
        self.status == BackupStatus::Completed
    }
}

/// Options for creating a backup
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Explicit name; derived from the date and id when absent
    pub name: Option<String>,
    /// Full or partial
    pub kind: BackupKind,
    /// Components to capture; required for partial backups
    pub components: Option<Vec<ComponentKind>>,
    /// Encrypt the assembled archive
    pub encrypt: bool,
    /// Deflate archive entries
    pub compress: bool,
    /// Retention in days; the configured default when absent
    pub retention_days: Option<u32>,
    /// Identity of the caller
    pub requester: String,
}

impl BackupOptions {
    /// Options for a full, compressed, unencrypted backup
    pub fn full(requester: impl Into<String>) -> Self {
        Self {
            name: None,
            kind: BackupKind::Full,
            components: None,
            encrypt: false,
            compress: true,
            retention_days: None,
            requester: requester.into(),
        }
    }

    /// Options for a partial backup of the given components
    pub fn partial(components: Vec<ComponentKind>, requester: impl Into<String>) -> Self {
        Self {
            kind: BackupKind::Partial,
            components: Some(components),
            ..Self::full(requester)
        }
    }

    /// Set an explicit backup name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable or disable archive encryption
    pub fn with_encryption(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    /// Enable or disable entry compression
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Set the retention period in days
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = Some(days);
        self
    }

    /// Resolve the components this backup captures
    ///
    /// Explicit lists are de-duplicated, keeping first occurrence order.
    pub fn effective_components(&self) -> BackupResult<Vec<ComponentKind>> {
        let requested = match (self.kind, &self.components) {
            (BackupKind::Full, None) => ComponentKind::ALL.to_vec(),
            (BackupKind::Full, Some(list)) | (BackupKind::Partial, Some(list)) => list.clone(),
            (BackupKind::Partial, None) => Vec::new(),
            (kind, _) => {
                return Err(BackupError::Validation(format!(
                    "Invalid backup type: {}. Must be \"full\" or \"partial\"",
                    kind
                )))
            }
        };

        let mut components = Vec::with_capacity(requested.len());
        for kind in requested {
            if !components.contains(&kind) {
                components.push(kind);
            }
        }

        if components.is_empty() {
            return Err(BackupError::Validation(
                "Components are required for partial backup".into(),
            ));
        }

        Ok(components)
    }
}
