// src/core/crypto/legacy.rs
use crate::aliases::CypherText;
use crate::consts::{NONCE_LEN, SEALED_FORMAT_V1, TAG_LEN};
use crate::core::kdf::SessionKeyMaterial;
use crate::core::Result;

use super::seal_message;

/// One-time migration: a legacy plaintext body sealed under the session key
pub fn upgrade_from_legacy(
    key: &SessionKeyMaterial,
    account_id: &str,
    legacy_body: &[u8],
) -> Result<CypherText> {
    seal_message(key, account_id, legacy_body)
}

/// Whether `body` has the shape of a sealed body.
///
/// Only a structural check; the `key_version` column is what marks a row as
/// legacy or sealed.
pub fn is_sealed_body(body: &[u8]) -> bool {
    body.len() >= 1 + NONCE_LEN + TAG_LEN && body[0] == SEALED_FORMAT_V1
}
