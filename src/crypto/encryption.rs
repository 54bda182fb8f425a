//! AES-256-GCM archive encryption
//!
//! Encrypts the fully assembled archive as one unit. Each call generates a
//! fresh random 16-byte IV which is prepended to the ciphertext, so the stored
//! form is `IV || ciphertext || tag`. GCM authentication makes a wrong key or
//! a flipped ciphertext byte fail decryption instead of yielding garbage.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};

use crate::error::{BackupError, BackupResult};

use super::EncryptionKey;

/// Size of the initialization vector prefixed to every encrypted archive
pub const IV_SIZE: usize = 16;

/// AES-256-GCM with a 128-bit IV
type ArchiveCipher = AesGcm<Aes256, U16>;

/// Encrypt `plaintext`, returning `IV || ciphertext`
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> BackupResult<Vec<u8>> {
    let cipher = ArchiveCipher::new_from_slice(key.as_bytes())
        .map_err(|e| BackupError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::<U16>::from_slice(&iv);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| BackupError::Encryption(format!("Encryption failed: {}", e)))?;

    let mut output = Vec::with_capacity(IV_SIZE + ciphertext.len());
    output.extend_from_slice(&iv);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt an IV-prefixed buffer produced by [`encrypt`]
pub fn decrypt(data: &[u8], key: &EncryptionKey) -> BackupResult<Vec<u8>> {
    if data.len() < IV_SIZE {
        return Err(BackupError::Decryption(format!(
            "Encrypted data too short: expected at least {} bytes, got {}",
            IV_SIZE,
            data.len()
        )));
    }

    let cipher = ArchiveCipher::new_from_slice(key.as_bytes())
        .map_err(|e| BackupError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let (iv, ciphertext) = data.split_at(IV_SIZE);
    let nonce = Nonce::<U16>::from_slice(iv);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| BackupError::Decryption("invalid key or corrupted data".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> EncryptionKey {
        EncryptionKey::from_bytes([0x42; 32])
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = test_key();
        let plaintext = b"Hello, World!";

        let encrypted = encrypt(plaintext, &key).unwrap();
        let decrypted = decrypt(&encrypted, &key).unwrap();

        assert_eq!(plaintext, decrypted.as_slice());
    }

    #[test]
    fn test_output_is_iv_prefixed() {
        let key = test_key();
        let encrypted = encrypt(b"abc", &key).unwrap();

        // IV + ciphertext (same length as plaintext for GCM) + 16-byte tag
        assert_eq!(encrypted.len(), IV_SIZE + 3 + 16);
    }

    #[test]
    fn test_different_ivs() {
        let key = test_key();
        let plaintext = b"Hello, World!";

        let encrypted1 = encrypt(plaintext, &key).unwrap();
        let encrypted2 = encrypt(plaintext, &key).unwrap();

        assert_ne!(&encrypted1[..IV_SIZE], &encrypted2[..IV_SIZE]);
        assert_ne!(encrypted1, encrypted2);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = encrypt(b"Hello, World!", &test_key()).unwrap();
        let other = EncryptionKey::from_bytes([0x24; 32]);

        let err = decrypt(&encrypted, &other).unwrap_err();
        assert!(err.is_decryption());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key();
        let mut encrypted = encrypt(b"Hello, World!", &key).unwrap();
        encrypted[IV_SIZE] ^= 0xFF;

        assert!(decrypt(&encrypted, &key).is_err());
    }

    #[test]
    fn test_truncated_input_fails() {
        let err = decrypt(&[0u8; 5], &test_key()).unwrap_err();
        assert!(err.is_decryption());
    }

    #[test]
    fn test_large_plaintext() {
        let key = test_key();
        let plaintext: Vec<u8> = (0..10000).map(|i| (i % 256) as u8).collect();

        let encrypted = encrypt(&plaintext, &key).unwrap();
        let decrypted = decrypt(&encrypted, &key).unwrap();

        assert_eq!(plaintext, decrypted);
    }
}
