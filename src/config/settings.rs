//! Settings for the backup subsystem
//!
//! Manages the retention default, the upload size limit, the symmetric
//! encryption passphrase and the key derivation parameters. Settings are
//! persisted as pretty-printed JSON next to the backup directories; the
//! passphrase may instead come from the `BACKUP_ENCRYPTION_KEY` environment
//! variable. The derivation salt is generated once and written to the
//! settings file, since archives can only be decrypted with the same salt.

use serde::{Deserialize, Serialize};

use super::paths::BackupPaths;
use crate::crypto::{EncryptionKey, KeyDerivationParams};
use crate::error::BackupError;

/// Environment variable overriding the configured encryption passphrase
pub const ENCRYPTION_KEY_ENV: &str = "BACKUP_ENCRYPTION_KEY";

/// Shortest retention a caller may request, in days
pub const MIN_RETENTION_DAYS: u32 = 1;

/// Longest retention a caller may request, in days
pub const MAX_RETENTION_DAYS: u32 = 365;

/// Settings for backup and restore operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSettings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Retention applied when a backup request does not specify one
    #[serde(default = "default_retention_days")]
    pub default_retention_days: u32,

    /// Largest archive accepted by import, in bytes
    #[serde(default = "default_max_import_bytes")]
    pub max_import_bytes: u64,

    /// Passphrase the archive encryption key is derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,

    /// Key derivation parameters (salt, memory cost, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_params: Option<KeyDerivationParams>,
}

fn default_schema_version() -> u32 {
    1
}

fn default_retention_days() -> u32 {
    30
}

fn default_max_import_bytes() -> u64 {
    500 * 1024 * 1024
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            default_retention_days: default_retention_days(),
            max_import_bytes: default_max_import_bytes(),
            encryption_key: None,
            key_params: None,
        }
    }
}

impl BackupSettings {
    /// Set the encryption passphrase
    ///
    /// Key derivation parameters are generated if none are set yet.
    pub fn with_encryption_key(mut self, passphrase: impl Into<String>) -> Self {
        self.encryption_key = Some(passphrase.into());
        self.ensure_key_params();
        self
    }

    /// Use specific key derivation parameters
    pub fn with_key_params(mut self, params: KeyDerivationParams) -> Self {
        self.key_params = Some(params);
        self
    }

    /// Generate key derivation parameters if none exist
    ///
    /// Returns true when new parameters were generated.
    pub fn ensure_key_params(&mut self) -> bool {
        if self.key_params.is_some() {
            return false;
        }
        self.key_params = Some(KeyDerivationParams::generate());
        true
    }

    /// Apply `BACKUP_ENCRYPTION_KEY` over the configured passphrase
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(ENCRYPTION_KEY_ENV) {
            if !key.is_empty() {
                self.encryption_key = Some(key);
            }
        }
        self
    }

    /// Derive the archive encryption key
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no passphrase or no derivation
    /// parameters are configured, and an encryption error when the
    /// parameters are unusable.
    pub fn encryption_key(&self) -> Result<EncryptionKey, BackupError> {
        let passphrase = match self.encryption_key.as_deref() {
            Some(passphrase) if !passphrase.is_empty() => passphrase,
            _ => {
                return Err(BackupError::Config(format!(
                    "No encryption key configured (set {} or encryptionKey)",
                    ENCRYPTION_KEY_ENV
                )))
            }
        };

        let params = self.key_params.as_ref().ok_or_else(|| {
            BackupError::Config("No key derivation parameters configured".to_string())
        })?;

        EncryptionKey::derive(passphrase, params)
    }

    /// Check that a requested retention is within the accepted range
    pub fn validate_retention(days: u32) -> Result<(), BackupError> {
        if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&days) {
            return Err(BackupError::Validation(format!(
                "Retention days must be between {} and {}",
                MIN_RETENTION_DAYS, MAX_RETENTION_DAYS
            )));
        }
        Ok(())
    }

    /// Load settings from disk, or create default settings if file doesn't exist
    ///
    /// Settings without key derivation parameters get a fresh salt, which is
    /// saved before returning. Environment overrides are applied after that
    /// and never written to disk.
    pub async fn load_or_create(paths: &BackupPaths) -> Result<Self, BackupError> {
        let settings_path = paths.settings_file();

        let mut settings = if settings_path.exists() {
            let contents = tokio::fs::read_to_string(&settings_path)
                .await
                .map_err(|e| BackupError::Io(format!("Failed to read settings file: {}", e)))?;

            serde_json::from_str::<BackupSettings>(&contents)
                .map_err(|e| BackupError::Config(format!("Failed to parse settings file: {}", e)))?
        } else {
            Self::default()
        };

        if settings.ensure_key_params() {
            tracing::info!(path = %settings_path.display(), "Generated key derivation parameters");
            settings.save(paths).await?;
        }

        Ok(settings.with_env_overrides())
    }

    /// Save settings to disk
    pub async fn save(&self, paths: &BackupPaths) -> Result<(), BackupError> {
        crate::storage::write_json_atomic(paths.settings_file(), self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::paths::LiveLayout;
    use tempfile::TempDir;

    fn create_test_paths() -> (BackupPaths, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let layout = LiveLayout::with_app_root(temp_dir.path().join("app"));
        let paths = BackupPaths::with_base_dir(temp_dir.path().join("state"), layout);
        (paths, temp_dir)
    }

    #[test]
    fn test_default_settings() {
        let settings = BackupSettings::default();
        assert_eq!(settings.default_retention_days, 30);
        assert_eq!(settings.max_import_bytes, 500 * 1024 * 1024);
        assert!(settings.encryption_key.is_none());
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let settings = BackupSettings::default();
        let err = settings.encryption_key().unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));

        let settings = BackupSettings::default().with_encryption_key("");
        assert!(settings.encryption_key().is_err());
    }

    #[test]
    fn test_validate_retention() {
        assert!(BackupSettings::validate_retention(1).is_ok());
        assert!(BackupSettings::validate_retention(365).is_ok());
        assert!(BackupSettings::validate_retention(0).unwrap_err().is_validation());
        assert!(BackupSettings::validate_retention(366).is_err());
    }

    /// Cheap costs so tests stay fast
    fn test_key_params() -> KeyDerivationParams {
        KeyDerivationParams {
            memory_cost: 8,
            time_cost: 1,
            parallelism: 1,
            ..KeyDerivationParams::generate()
        }
    }

    #[test]
    fn test_encryption_key_uses_stored_params() {
        let params = test_key_params();
        let a = BackupSettings::default()
            .with_key_params(params.clone())
            .with_encryption_key("s3cret");
        let b = BackupSettings::default()
            .with_key_params(params)
            .with_encryption_key("s3cret");
        assert_eq!(
            a.encryption_key().unwrap().as_bytes(),
            b.encryption_key().unwrap().as_bytes()
        );

        let other_salt = BackupSettings::default()
            .with_key_params(test_key_params())
            .with_encryption_key("s3cret");
        assert_ne!(
            a.encryption_key().unwrap().as_bytes(),
            other_salt.encryption_key().unwrap().as_bytes()
        );
    }

    #[test]
    fn test_missing_key_params_is_config_error() {
        let mut settings = BackupSettings::default();
        settings.encryption_key = Some("s3cret".to_string());
        assert!(matches!(
            settings.encryption_key().unwrap_err(),
            BackupError::Config(_)
        ));
    }

    #[tokio::test]
    async fn test_first_load_persists_generated_salt() {
        let (paths, _temp) = create_test_paths();

        let first = BackupSettings::load_or_create(&paths).await.unwrap();
        assert!(paths.settings_file().exists());
        let salt = first.key_params.clone().unwrap().salt;

        let second = BackupSettings::load_or_create(&paths).await.unwrap();
        assert_eq!(second.key_params.unwrap().salt, salt);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (paths, _temp) = create_test_paths();

        let mut settings = BackupSettings::default()
            .with_key_params(test_key_params())
            .with_encryption_key("s3cret");
        settings.default_retention_days = 7;
        settings.save(&paths).await.unwrap();

        let loaded = BackupSettings::load_or_create(&paths).await.unwrap();
        assert_eq!(loaded.default_retention_days, 7);
        assert!(loaded.encryption_key.is_some());
        assert_eq!(loaded.key_params, settings.key_params);
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = serde_json::to_string(&BackupSettings::default()).unwrap();
        assert!(json.contains("defaultRetentionDays"));
        assert!(!json.contains("encryptionKey"));
        assert!(!json.contains("keyParams"));

        let settings = BackupSettings::default().with_key_params(test_key_params());
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"keyParams\""));
        assert!(json.contains("\"memoryCost\""));
    }
}
