// src/core/verifier.rs
//! Non-secret key commitment stored per account
//!
//! A verifier records everything needed to re-derive an account's key from
//! its password (salt, Argon2 cost, key version) plus a BLAKE3 keyed-hash
//! commitment that proves a derived key is the right one. It never contains
//! key bytes or anything that reveals them without the password.
//!
//! Persisted form (JSON):
//!
//! ```json
//! { "version": 2, "salt": "<32 hex>", "commitment": "<64 hex>",
//!   "kdf": { "memory_kib": 65536, "iterations": 3, "parallelism": 1 } }
//! ```

use serde::{Deserialize, Serialize};

use crate::aliases::Password;
use crate::consts::{COMMITMENT_LEN, SALT_LEN};
use crate::core::kdf::{derive_key_material, generate_salt, KdfParams, SessionKeyMaterial};
use crate::core::Result;
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVerifier {
    version: u32,
    salt: [u8; SALT_LEN],
    commitment: [u8; COMMITMENT_LEN],
    kdf: KdfParams,
}

#[derive(Serialize, Deserialize)]
struct VerifierRecord {
    version: u32,
    salt: String,
    commitment: String,
    kdf: KdfParams,
}

impl KeyVerifier {
    /// Derive fresh key material under a new random salt and commit to it.
    pub fn create(
        password: &Password,
        account_id: &str,
        version: u32,
        kdf: KdfParams,
    ) -> Result<(KeyVerifier, SessionKeyMaterial)> {
        let salt = generate_salt();
        let material = derive_key_material(password, account_id, version, &salt, &kdf)?;
        let verifier = KeyVerifier {
            version,
            salt,
            commitment: *material.commitment(),
            kdf,
        };
        Ok((verifier, material))
    }

    /// Re-derive the key this verifier commits to.
    ///
    /// `Ok(None)` means the password is wrong for this verifier.
    pub fn unlock(
        &self,
        password: &Password,
        account_id: &str,
    ) -> Result<Option<SessionKeyMaterial>> {
        let material =
            derive_key_material(password, account_id, self.version, &self.salt, &self.kdf)?;
        Ok(self.matches(&material).then_some(material))
    }

    /// Constant-time comparison of the stored commitment with `material`'s
    pub fn matches(&self, material: &SessionKeyMaterial) -> bool {
        material.version() == self.version
            && blake3::Hash::from(self.commitment) == blake3::Hash::from(*material.commitment())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// Short identifier for logs
    pub fn fingerprint(&self) -> String {
        crate::core::util::fingerprint(&self.commitment)
    }

    pub fn to_json(&self) -> Result<String> {
        let record = VerifierRecord {
            version: self.version,
            salt: hex::encode(self.salt),
            commitment: hex::encode(self.commitment),
            kdf: self.kdf,
        };
        Ok(serde_json::to_string(&record)?)
    }

    /// Parse and validate a stored record. Any defect is [`CoreError::CorruptVerifier`].
    pub fn from_json(raw: &str) -> Result<KeyVerifier> {
        let record: VerifierRecord =
            serde_json::from_str(raw).map_err(|e| CoreError::CorruptVerifier(e.to_string()))?;

        let salt = decode_fixed::<SALT_LEN>(&record.salt, "salt")?;
        let commitment = decode_fixed::<COMMITMENT_LEN>(&record.commitment, "commitment")?;
        record
            .kdf
            .validate()
            .map_err(|e| CoreError::CorruptVerifier(e.to_string()))?;
        if record.version == 0 {
            return Err(CoreError::CorruptVerifier("version 0 is reserved".into()));
        }

        Ok(KeyVerifier {
            version: record.version,
            salt,
            commitment,
            kdf: record.kdf,
        })
    }
}

fn decode_fixed<const N: usize>(hex_str: &str, field: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| CoreError::CorruptVerifier(format!("{field}: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        CoreError::CorruptVerifier(format!("{field}: expected {N} bytes, got {}", b.len()))
    })
}
