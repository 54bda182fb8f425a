//! Core data models for the backup subsystem
//!
//! This module contains the records persisted as sidecars (backups and
//! restores), the component kinds they refer to, and the caller-facing
//! option types.

pub mod backup;
pub mod component;
pub mod restore;

pub use backup::{BackupKind, BackupOptions, BackupRecord, BackupStatus, ComponentRecord, Retention};
pub use component::ComponentKind;
pub use restore::{ComponentOutcome, RestoreOptions, RestoreRecord, RestoreStatus, RollbackEntry};
