//! Backup and restore orchestration
//!
//! # Architecture
//!
//! - `BackupManager`: captures components, assembles, encrypts and stores
//!   archives; lists, deletes, expires, downloads and imports them
//! - `RestoreManager`: validates archives and writes components back onto the
//!   live layout, with per-component reporting and rollback
//! - `ComponentRestorer`: the restore strategy for one component kind
//!
//! Both managers share one set of resource locks, so a restore and a backup
//! touching the same component never interleave.
//!
//! # Example
//!
//! ```rust,ignore
//! use appstate_backup::backup::{BackupManager, RestoreManager};
//! use appstate_backup::models::{BackupOptions, RestoreOptions};
//!
//! let backups = BackupManager::from_env().await?;
//! let record = backups.create(BackupOptions::full("admin").with_encryption(true)).await?;
//!
//! let restores = RestoreManager::new(backups.clone());
//! let restore = restores
//!     .create(RestoreOptions::new(&record.id, "admin").with_overwrite(true))
//!     .await?;
//! println!("{}", restore.status);
//! ```

mod manager;
mod restore;
mod restorer;

pub use manager::{validate_name, BackupManager, ValidatedArchive};
pub use restore::RestoreManager;
pub use restorer::{undo, ComponentRestorer, RestoreContext};
