// src/db/store.rs
//! Narrow persistence interface over the hosted message store
//!
//! The manager and the messaging layer only ever talk to storage through
//! [`MessageStore`]. Implementations own their connection handling and must
//! be shareable across threads: the re-encryption pass runs off the caller's
//! thread while the messaging layer keeps reading.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::verifier::KeyVerifier;
use crate::core::Result;
use crate::enums::VerifierSlot;

/// One stored message row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub account_id: String,
    /// `None` marks legacy plaintext; `Some(v)` a body sealed under key version `v`
    pub key_version: Option<u32>,
    pub body: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn is_legacy(&self) -> bool {
        self.key_version.is_none()
    }
}

pub trait MessageStore: Send + Sync {
    /// All messages of `account_id`, ascending by id
    fn messages_for_account(&self, account_id: &str) -> Result<Vec<StoredMessage>>;

    /// Insert a message and return its id
    fn insert_message(&self, account_id: &str, key_version: Option<u32>, body: &[u8])
        -> Result<i64>;

    /// Replace a message body and record the key version that sealed it
    fn write_ciphertext(&self, message_id: i64, key_version: u32, body: &[u8]) -> Result<()>;

    /// Unreadable records surface as
    /// [`CoreError::CorruptVerifier`](crate::error::CoreError::CorruptVerifier)
    fn load_verifier(&self, account_id: &str, slot: VerifierSlot) -> Result<Option<KeyVerifier>>;

    fn store_verifier(
        &self,
        account_id: &str,
        slot: VerifierSlot,
        verifier: &KeyVerifier,
    ) -> Result<()>;

    /// Make the pending verifier current, superseding the previous one
    fn promote_pending_verifier(&self, account_id: &str) -> Result<()>;

    /// Remove the verifier in `slot`, if any, keeping its history entry as superseded
    fn discard_verifier(&self, account_id: &str, slot: VerifierSlot) -> Result<()>;

    /// Highest key version referenced by any message or verifier row, 0 if none
    fn max_key_version(&self, account_id: &str) -> Result<u32>;

    /// Remove every message and verifier of the account; returns deleted message count
    fn delete_account(&self, account_id: &str) -> Result<usize>;

    /// Messages whose `key_version` equals `key_version`, ascending by id
    fn messages_with_version(
        &self,
        account_id: &str,
        key_version: Option<u32>,
    ) -> Result<Vec<StoredMessage>> {
        Ok(self
            .messages_for_account(account_id)?
            .into_iter()
            .filter(|m| m.key_version == key_version)
            .collect())
    }

    fn count_legacy(&self, account_id: &str) -> Result<usize> {
        Ok(self.messages_with_version(account_id, None)?.len())
    }
}
