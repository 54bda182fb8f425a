//! Component kinds
//!
//! A component is one independently serializable data domain of the
//! application. Each kind maps to exactly one entry in the backup archive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BackupError;

/// One of the four backup components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// The relational database backing file
    Database,
    /// Named configuration files
    Config,
    /// Cache directories
    Cache,
    /// User-uploaded and public files
    Files,
}

impl ComponentKind {
    /// All components, in the order a full backup processes them
    pub const ALL: [ComponentKind; 4] = [Self::Database, Self::Config, Self::Cache, Self::Files];

    /// Lower-case component name as used in records and requests
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Config => "config",
            Self::Cache => "cache",
            Self::Files => "files",
        }
    }

    /// Name of this component's entry in the outer archive
    pub fn archive_entry(&self) -> &'static str {
        match self {
            Self::Database => "database.db",
            Self::Config => "config.zip",
            Self::Cache => "cache.zip",
            Self::Files => "files.zip",
        }
    }

    /// Parse a component from its name
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "database" | "db" => Some(Self::Database),
            "config" | "configuration" => Some(Self::Config),
            "cache" => Some(Self::Cache),
            "files" => Some(Self::Files),
            _ => None,
        }
    }
}

impl FromStr for ComponentKind {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            BackupError::Validation(format!(
                "Invalid component: {}. Valid components: database, config, cache, files",
                s
            ))
        })
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Join component names for log and error messages
pub fn join_names(kinds: &[ComponentKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(ComponentKind::parse("database"), Some(ComponentKind::Database));
        assert_eq!(ComponentKind::parse(" Files "), Some(ComponentKind::Files));
        assert_eq!(ComponentKind::parse("logs"), None);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        let err = "logs".parse::<ComponentKind>().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("logs"));
    }

    #[test]
    fn test_archive_entries() {
        assert_eq!(ComponentKind::Database.archive_entry(), "database.db");
        assert_eq!(ComponentKind::Config.archive_entry(), "config.zip");
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&ComponentKind::Files).unwrap();
        assert_eq!(json, "\"files\"");
        let kind: ComponentKind = serde_json::from_str("\"config\"").unwrap();
        assert_eq!(kind, ComponentKind::Config);
    }

    #[test]
    fn test_join_names() {
        assert_eq!(
            join_names(&[ComponentKind::Config, ComponentKind::Files]),
            "config, files"
        );
    }
}
