// src/core/crypto/encrypt.rs
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::XChaCha20Poly1305;

use crate::aliases::CypherText;
use crate::consts::{NONCE_LEN, SEALED_FORMAT_V1, TAG_LEN};
use crate::core::kdf::SessionKeyMaterial;
use crate::core::Result;
use crate::error::CoreError;

use super::message_aad;

/// Seal `plaintext` for `account_id` under `key`, with a fresh random nonce
pub fn seal_message(
    key: &SessionKeyMaterial,
    account_id: &str,
    plaintext: &[u8],
) -> Result<CypherText> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.message_key().expose_secret())
        .map_err(|_| CoreError::Encrypt)?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let aad = message_aad(account_id, key.version());

    let sealed = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| CoreError::Encrypt)?;

    let mut out = Vec::with_capacity(1 + NONCE_LEN + plaintext.len() + TAG_LEN);
    out.push(SEALED_FORMAT_V1);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(CypherText::new(out))
}
