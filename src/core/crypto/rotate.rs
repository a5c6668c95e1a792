// src/core/crypto/rotate.rs
use crate::aliases::CypherText;
use crate::core::kdf::SessionKeyMaterial;
use crate::core::Result;

use super::{open_message, seal_message};

/// Pure in-memory rotation of one message: old key -> new key
pub fn rotate_message(
    old_key: &SessionKeyMaterial,
    new_key: &SessionKeyMaterial,
    account_id: &str,
    sealed: &[u8],
) -> Result<CypherText> {
    let plaintext = open_message(old_key, account_id, sealed)?;
    seal_message(new_key, account_id, plaintext.expose_secret())
}
