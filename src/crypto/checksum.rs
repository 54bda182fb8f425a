//! SHA-256 checksums
//!
//! Checksums are lower-case hex strings so they can be stored verbatim in
//! sidecar records and compared without decoding.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of `data` as a lower-case hex string
pub fn checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Check `data` against an expected hex digest
pub fn matches(data: &[u8], expected: &str) -> bool {
    checksum(data).eq_ignore_ascii_case(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_deterministic() {
        let data: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        assert_eq!(checksum(&data), checksum(&data));
        assert_eq!(checksum(&data).len(), 64);
    }

    #[test]
    fn test_single_byte_change_detected() {
        let mut data = b"backup payload".to_vec();
        let original = checksum(&data);
        data[3] ^= 0x01;
        assert!(!matches(&data, &original));
    }
}
