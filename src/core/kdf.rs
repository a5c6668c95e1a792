// src/core/kdf.rs
//! Password key derivation
//!
//! Argon2id stretches `password + per-account salt` into a 32-byte root.
//! The root is split with BLAKE3 `derive_key` into two independent keys:
//!
//! - the **message key**, which seals stored messages and stays in memory
//! - the **verifier key**, which only ever produces the public commitment
//!   stored in the account's [`KeyVerifier`](crate::core::verifier::KeyVerifier)
//!
//! Neither the root nor the verifier key outlives [`derive_key_material`].

use std::fmt;

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::aliases::{MessageKey32, Password};
use crate::consts::{
    COMMITMENT_LABEL, COMMITMENT_LEN, DEFAULT_KDF_ITERATIONS, DEFAULT_KDF_MEMORY_KIB,
    DEFAULT_KDF_PARALLELISM, FAST_KDF_ITERATIONS, FAST_KDF_MEMORY_KIB, MAX_KDF_ITERATIONS,
    MAX_KDF_MEMORY_KIB, MAX_KDF_PARALLELISM, MESSAGE_KEY_CONTEXT, SALT_LEN, VERIFIER_KEY_CONTEXT,
};
use crate::core::Result;
use crate::error::CoreError;

/// Argon2id cost parameters, stored alongside every verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Interactive desktop/browser cost: 64 MiB, 3 passes, 1 lane
    pub fn interactive() -> Self {
        KdfParams {
            memory_kib: DEFAULT_KDF_MEMORY_KIB,
            iterations: DEFAULT_KDF_ITERATIONS,
            parallelism: DEFAULT_KDF_PARALLELISM,
        }
    }

    /// Minimum cost, for tests only
    pub fn fast() -> Self {
        KdfParams {
            memory_kib: FAST_KDF_MEMORY_KIB,
            iterations: FAST_KDF_ITERATIONS,
            parallelism: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.argon2().map(|_| ())
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        // checked before Argon2 allocates anything
        if self.memory_kib > MAX_KDF_MEMORY_KIB
            || self.iterations > MAX_KDF_ITERATIONS
            || self.parallelism > MAX_KDF_PARALLELISM
        {
            return Err(CoreError::KeyDerivationFailure(format!(
                "cost {}KiB/{}/{} exceeds the accepted maximum",
                self.memory_kib, self.iterations, self.parallelism
            )));
        }
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(32),
        )
        .map_err(|e| CoreError::KeyDerivationFailure(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Key material for one key version of one account. Zeroized on drop.
pub struct SessionKeyMaterial {
    version: u32,
    message_key: MessageKey32,
    commitment: [u8; COMMITMENT_LEN],
}

impl SessionKeyMaterial {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn message_key(&self) -> &MessageKey32 {
        &self.message_key
    }

    /// Public commitment to this key; safe to persist
    pub fn commitment(&self) -> &[u8; COMMITMENT_LEN] {
        &self.commitment
    }
}

impl fmt::Debug for SessionKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyMaterial")
            .field("version", &self.version)
            .field("message_key", &"[REDACTED]")
            .finish()
    }
}

/// Fresh random per-account salt (not secret; stored in the verifier)
pub fn generate_salt() -> [u8; SALT_LEN] {
    rand::random()
}

/// Derive the key material for `account_id` at `version`.
///
/// Callers own the `Password` and drop it (zeroizing it) right after their
/// last derivation; the Argon2 root never leaves this function.
pub fn derive_key_material(
    password: &Password,
    account_id: &str,
    version: u32,
    salt: &[u8; SALT_LEN],
    params: &KdfParams,
) -> Result<SessionKeyMaterial> {
    let argon2 = params.argon2()?;

    let mut root = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut root[..])
        .map_err(|e| CoreError::KeyDerivationFailure(e.to_string()))?;

    let message_key = MessageKey32::new(blake3::derive_key(MESSAGE_KEY_CONTEXT, &root[..]));
    let verifier_key = Zeroizing::new(blake3::derive_key(VERIFIER_KEY_CONTEXT, &root[..]));
    let commitment = commitment_for(&verifier_key, account_id, version);

    Ok(SessionKeyMaterial {
        version,
        message_key,
        commitment,
    })
}

fn commitment_for(verifier_key: &[u8; 32], account_id: &str, version: u32) -> [u8; COMMITMENT_LEN] {
    let mut hasher = blake3::Hasher::new_keyed(verifier_key);
    hasher.update(COMMITMENT_LABEL);
    hasher.update(account_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(&version.to_le_bytes());
    *hasher.finalize().as_bytes()
}
