// src/core/crypto/decrypt.rs
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::aliases::PlainText;
use crate::consts::{NONCE_LEN, SEALED_FORMAT_V1, TAG_LEN};
use crate::core::kdf::SessionKeyMaterial;
use crate::core::Result;
use crate::error::CoreError;

use super::message_aad;

/// Open a sealed body. Fails with [`CoreError::Decrypt`] on any key, account,
/// version or integrity mismatch.
pub fn open_message(
    key: &SessionKeyMaterial,
    account_id: &str,
    sealed: &[u8],
) -> Result<PlainText> {
    if sealed.len() < 1 + NONCE_LEN + TAG_LEN || sealed[0] != SEALED_FORMAT_V1 {
        return Err(CoreError::Decrypt);
    }
    let (nonce, body) = sealed[1..].split_at(NONCE_LEN);

    let cipher = XChaCha20Poly1305::new_from_slice(key.message_key().expose_secret())
        .map_err(|_| CoreError::Decrypt)?;
    let aad = message_aad(account_id, key.version());

    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: body,
                aad: &aad,
            },
        )
        .map_err(|_| CoreError::Decrypt)?;
    Ok(PlainText::new(plaintext))
}
