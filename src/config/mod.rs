//! Configuration module for the backup subsystem
//!
//! This module provides configuration management including:
//! - Backup, scratch, restore and rollback directory resolution
//! - The live application layout captured by each component
//! - Persisted settings (retention default, import limit, encryption key)

pub mod paths;
pub mod settings;

pub use paths::{BackupPaths, LiveLayout};
pub use settings::BackupSettings;
