//! Integrity and cryptographic functions for backup archives
//!
//! Provides SHA-256 checksums for component payloads and whole archives, and
//! AES-256-GCM encryption of the assembled archive as a single unit. The
//! encrypted form is `IV (16 bytes) || ciphertext`.

pub mod checksum;
pub mod encryption;
pub mod key;

pub use checksum::checksum;
pub use encryption::{decrypt, encrypt, IV_SIZE};
pub use key::{EncryptionKey, KeyDerivationParams};
