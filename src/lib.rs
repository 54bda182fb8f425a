//! appstate-backup - Backup and restore of application state
//!
//! This library produces durable, integrity-verified, optionally encrypted
//! snapshots of an application's persistent state (a database file,
//! configuration files, cache directories and user file directories), and
//! validates and restores such snapshots with per-component reporting and
//! rollback.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Path management, live layout and persisted settings
//! - `error`: Custom error types
//! - `models`: Backup and restore records and their options
//! - `storage`: Atomic file writes and JSON sidecar stores
//! - `crypto`: SHA-256 checksums and AES-256-GCM archive encryption
//! - `archive`: Zip container codec and component serializers
//! - `backup`: Backup and restore orchestration
//! - `locks`: Per-resource mutual exclusion
//! - `logging`: Subscriber setup for host binaries
//!
//! # Example
//!
//! ```rust,ignore
//! use appstate_backup::{BackupManager, BackupOptions};
//!
//! appstate_backup::logging::init("info")?;
//! let manager = BackupManager::from_env().await?;
//! let record = manager.create(BackupOptions::full("admin")).await?;
//! manager.cleanup().await?;
//! ```

pub mod archive;
pub mod backup;
pub mod config;
pub mod crypto;
pub mod error;
pub mod locks;
pub mod logging;
pub mod models;
pub mod storage;

pub use backup::{BackupManager, RestoreManager};
pub use config::{BackupPaths, BackupSettings, LiveLayout};
pub use error::{BackupError, BackupResult};
pub use models::{
    BackupKind, BackupOptions, BackupRecord, BackupStatus, ComponentKind, RestoreOptions,
    RestoreRecord, RestoreStatus,
};
