//! Restore records
//!
//! A [`RestoreRecord`] is the audit trail of one restore attempt. Records are
//! persisted at every state transition so in-flight restores are observable,
//! and are never deleted automatically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::component::ComponentKind;
use crate::error::{BackupError, BackupResult};

/// Lifecycle status of a restore attempt
///
/// `pending → validating → (restoring | completed) → (completed | failed)`,
/// and `failed → rolled_back`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    Pending,
    Validating,
    Restoring,
    Completed,
    Failed,
    RolledBack,
}

impl RestoreStatus {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: RestoreStatus) -> bool {
        use RestoreStatus::*;
        matches!(
            (self, next),
            (Pending, Validating)
                | (Pending, Failed)
                | (Validating, Restoring)
                | (Validating, Completed)
                | (Validating, Failed)
                | (Restoring, Completed)
                | (Restoring, Failed)
                | (Failed, RolledBack)
        )
    }

    /// Whether no further transition happens without an explicit rollback
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RolledBack)
    }
}

impl fmt::Display for RestoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Restoring => "restoring",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        };
        write!(f, "{}", s)
    }
}

/// Result of restoring one component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentOutcome {
    pub component: ComponentKind,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentOutcome {
    /// A successful component restore
    pub fn succeeded(component: ComponentKind, message: impl Into<String>) -> Self {
        Self {
            component,
            success: true,
            message: message.into(),
            error: None,
        }
    }

    /// A failed component restore
    pub fn failed(component: ComponentKind, error: &BackupError) -> Self {
        Self {
            component,
            success: false,
            message: format!("{} restoration failed", component),
            error: Some(error.to_string()),
        }
    }
}

/// A live file touched by a restore, and where its previous content was saved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackEntry {
    /// Live path that was written
    pub target: PathBuf,
    /// Copy of the previous content; `None` when the target did not exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,
}

/// Options for a restore attempt
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Backup to restore from
    pub backup_id: String,
    /// Components to restore; every backed-up component when absent
    pub components: Option<Vec<ComponentKind>>,
    /// Replace existing live files
    pub overwrite: bool,
    /// Verify the archive without writing live files
    pub validate_only: bool,
    /// Identity of the caller
    pub requester: String,
}

impl RestoreOptions {
    /// Restore every component of a backup without overwriting
    pub fn new(backup_id: impl Into<String>, requester: impl Into<String>) -> Self {
        Self {
            backup_id: backup_id.into(),
            components: None,
            overwrite: false,
            validate_only: false,
            requester: requester.into(),
        }
    }

    /// Restrict the restore to a subset of components
    pub fn with_components(mut self, components: Vec<ComponentKind>) -> Self {
        self.components = Some(components);
        self
    }

    /// Replace existing live files
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Only validate the archive
    pub fn validate_only(mut self) -> Self {
        self.validate_only = true;
        self
    }
}

/// Audit record of one restore attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRecord {
    pub id: String,
    pub backup_id: String,
    /// Resolved name of the source backup
    pub backup_name: String,
    pub status: RestoreStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub requested_by: String,
    /// Requested component subset; empty means every backed-up component
    pub components: Vec<ComponentKind>,
    pub validated: bool,
    /// Scratch directory the archive was extracted into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub rollback_performed: bool,
    #[serde(default)]
    pub results: Vec<ComponentOutcome>,
    #[serde(default)]
    pub rollback: Vec<RollbackEntry>,
}

impl RestoreRecord {
    /// Start a new record in the `pending` state
    pub fn pending(options: &RestoreOptions) -> Self {
        let now = Utc::now();
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(9).collect();

        Self {
            id: format!("restore-{}-{}", now.timestamp_millis(), suffix),
            backup_id: options.backup_id.clone(),
            backup_name: String::new(),
            status: RestoreStatus::Pending,
            started_at: now,
            completed_at: None,
            requested_by: options.requester.clone(),
            components: options.components.clone().unwrap_or_default(),
            validated: false,
            restore_path: None,
            error_message: None,
            rollback_performed: false,
            results: Vec::new(),
            rollback: Vec::new(),
        }
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn transition(&mut self, next: RestoreStatus) -> BackupResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(BackupError::InvalidState(format!(
                "Restore {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Move to `failed` with a reason
    ///
    /// Records already in a terminal state keep their status and only gain
    /// the message.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status.can_transition_to(RestoreStatus::Failed) {
            self.status = RestoreStatus::Failed;
        }
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
    }

    /// Components whose restore failed
    pub fn failed_components(&self) -> Vec<ComponentKind> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.component)
            .collect()
    }
}
