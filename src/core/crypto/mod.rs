// src/core/crypto/mod.rs
//! Pure message cryptography: no I/O, no database
//!
//! All functions work exclusively on in-memory buffers.
//!
//! Sealed body wire format:
//!   [ 0x01 | nonce (24 bytes) | XChaCha20-Poly1305 ciphertext + tag ]
//!
//! The associated data binds a body to its account and key version, so a
//! body copied to another account or relabelled with another version fails
//! to open.
mod decrypt;
mod encrypt;
mod legacy;
mod rotate;

pub use decrypt::open_message;
pub use encrypt::seal_message;
pub use legacy::{is_sealed_body, upgrade_from_legacy};
pub use rotate::rotate_message;

/// Associated data for a message sealed under `key_version` of `account_id`
pub fn message_aad(account_id: &str, key_version: u32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(account_id.len() + 5);
    aad.extend_from_slice(account_id.as_bytes());
    aad.push(0);
    aad.extend_from_slice(&key_version.to_le_bytes());
    aad
}
