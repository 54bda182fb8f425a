//! Custom error types for the backup subsystem
//!
//! This module defines the error hierarchy for backup and restore operations
//! using thiserror for ergonomic error definitions.

use thiserror::Error;

/// The main error type for backup and restore operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid caller input (options, names, component lists)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Duplicate entity errors
    #[error("{entity_type} already exists: {identifier}")]
    Duplicate {
        entity_type: &'static str,
        identifier: String,
    },

    /// A requested component could not be read or assembled
    #[error("{component} backup failed: {message}")]
    ComponentSerialization { component: String, message: String },

    /// A single component could not be restored
    #[error("{component} restoration failed: {message}")]
    ComponentRestore { component: String, message: String },

    /// Low-level zip container errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Malformed, empty or incomplete backup archive
    #[error("Backup validation failed: {0}")]
    ArchiveStructure(String),

    /// Stored bytes do not match the recorded checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Encryption errors
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Wrong key or corrupted ciphertext
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Operation not legal in the record's current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),
}

impl BackupError {
    /// Create a "not found" error for backups
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for restores
    pub fn restore_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Restore",
            identifier: identifier.into(),
        }
    }

    /// Create a serialization error for a named component
    pub fn component_serialization(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ComponentSerialization {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a restore error for a named component
    pub fn component_restore(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ComponentRestore {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a decryption error
    pub fn is_decryption(&self) -> bool {
        matches!(self, Self::Decryption(_))
    }

    /// Check if the archive failed integrity or structural checks
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::ArchiveStructure(_)
        )
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<zip::result::ZipError> for BackupError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

impl From<tokio::task::JoinError> for BackupError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Io(format!("Background task failed: {}", err))
    }
}

/// Result type alias for backup operations
pub type BackupResult<T> = Result<T, BackupError>;
