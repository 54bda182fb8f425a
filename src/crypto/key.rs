//! Archive encryption keys
//!
//! Keys are derived from the configured passphrase with Argon2id, using a
//! random salt and cost parameters that are persisted in the settings file.
//! The same passphrase and parameters always yield the same key, so archives
//! stay readable across restarts. Key bytes are wiped when the key is dropped.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{BackupError, BackupResult};

/// Parameters for key derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDerivationParams {
    /// Salt (base64, as produced by `SaltString`)
    pub salt: String,
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism degree (default: 4)
    pub parallelism: u32,
}

impl Default for KeyDerivationParams {
    fn default() -> Self {
        Self {
            salt: String::new(),
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KeyDerivationParams {
    /// Default costs with a freshly generated salt
    pub fn generate() -> Self {
        let salt = SaltString::generate(&mut OsRng);
        Self {
            salt: salt.to_string(),
            ..Default::default()
        }
    }

    /// Create params with specific values
    pub fn with_values(salt: String, memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            salt,
            memory_cost,
            time_cost,
            parallelism,
        }
    }
}

/// A 256-bit symmetric key for archive encryption
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    /// Derive a key from a passphrase
    ///
    /// # Errors
    ///
    /// Returns `Encryption` when the salt or the cost parameters are invalid.
    pub fn derive(passphrase: &str, params: &KeyDerivationParams) -> BackupResult<Self> {
        let salt = SaltString::from_b64(&params.salt)
            .map_err(|e| BackupError::Encryption(format!("Invalid salt: {}", e)))?;

        let argon2_params = Params::new(
            params.memory_cost,
            params.time_cost,
            params.parallelism,
            Some(32),
        )
        .map_err(|e| BackupError::Encryption(format!("Invalid Argon2 parameters: {}", e)))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

        let hash = argon2
            .hash_password(passphrase.as_bytes(), &salt)
            .map_err(|e| BackupError::Encryption(format!("Key derivation failed: {}", e)))?;

        let output = hash
            .hash
            .ok_or_else(|| BackupError::Encryption("No hash output generated".to_string()))?;

        let bytes = output.as_bytes();
        if bytes.len() < 32 {
            return Err(BackupError::Encryption(
                "Hash output too short for AES-256 key".to_string(),
            ));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[..32]);
        Ok(Self { key })
    }

    /// Wrap raw key bytes
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

// Don't print key material in Debug output
impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey").finish_non_exhaustive()
    }
}
