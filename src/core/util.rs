// src/core/util.rs
//! Small utility functions used across the core module
//!
//! Hashing helpers for identifiers that are safe to log.

use blake3::Hasher;

/// Compute BLAKE3 hash and return as lowercase hex string
pub fn blake3_hex(data: &[u8]) -> String {
    Hasher::new().update(data).finalize().to_hex().to_string()
}

/// First 12 hex chars of the BLAKE3 hash of `data`
pub fn fingerprint(data: &[u8]) -> String {
    let mut hex = blake3_hex(data);
    hex.truncate(12);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_a_stable_prefix() {
        let full = blake3_hex(b"commitment");
        assert_eq!(full.len(), 64);
        assert_eq!(fingerprint(b"commitment"), full[..12]);
    }
}
