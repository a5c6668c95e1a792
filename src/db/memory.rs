// src/db/memory.rs
//! In-process [`MessageStore`], for embedding and tests

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::core::verifier::KeyVerifier;
use crate::core::Result;
use crate::db::store::{MessageStore, StoredMessage};
use crate::enums::VerifierSlot;
use crate::error::CoreError;

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    messages: BTreeMap<i64, StoredMessage>,
    // Verifiers are kept in their persisted JSON form, like the SQLite store.
    verifiers: HashMap<(String, VerifierSlot), (u32, String)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a raw verifier record as-is (used to simulate damaged storage)
    pub fn put_raw_verifier(&self, account_id: &str, slot: VerifierSlot, version: u32, raw: &str) {
        self.lock()
            .verifiers
            .insert((account_id.to_owned(), slot), (version, raw.to_owned()));
    }

    pub fn message(&self, message_id: i64) -> Option<StoredMessage> {
        self.lock().messages.get(&message_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageStore for MemoryStore {
    fn messages_for_account(&self, account_id: &str) -> Result<Vec<StoredMessage>> {
        Ok(self
            .lock()
            .messages
            .values()
            .filter(|m| m.account_id == account_id)
            .cloned()
            .collect())
    }

    fn insert_message(
        &self,
        account_id: &str,
        key_version: Option<u32>,
        body: &[u8],
    ) -> Result<i64> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.messages.insert(
            id,
            StoredMessage {
                id,
                account_id: account_id.to_owned(),
                key_version,
                body: body.to_vec(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    fn write_ciphertext(&self, message_id: i64, key_version: u32, body: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        let message = inner
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| CoreError::Store(format!("no message with id {message_id}")))?;
        message.key_version = Some(key_version);
        message.body = body.to_vec();
        Ok(())
    }

    fn load_verifier(&self, account_id: &str, slot: VerifierSlot) -> Result<Option<KeyVerifier>> {
        let inner = self.lock();
        match inner.verifiers.get(&(account_id.to_owned(), slot)) {
            Some((_, raw)) => KeyVerifier::from_json(raw).map(Some),
            None => Ok(None),
        }
    }

    fn store_verifier(
        &self,
        account_id: &str,
        slot: VerifierSlot,
        verifier: &KeyVerifier,
    ) -> Result<()> {
        let raw = verifier.to_json()?;
        self.lock()
            .verifiers
            .insert((account_id.to_owned(), slot), (verifier.version(), raw));
        Ok(())
    }

    fn promote_pending_verifier(&self, account_id: &str) -> Result<()> {
        let mut inner = self.lock();
        let pending = inner
            .verifiers
            .remove(&(account_id.to_owned(), VerifierSlot::Pending))
            .ok_or_else(|| CoreError::Store(format!("no pending verifier for {account_id}")))?;
        inner
            .verifiers
            .insert((account_id.to_owned(), VerifierSlot::Current), pending);
        Ok(())
    }

    fn discard_verifier(&self, account_id: &str, slot: VerifierSlot) -> Result<()> {
        self.lock().verifiers.remove(&(account_id.to_owned(), slot));
        Ok(())
    }

    fn max_key_version(&self, account_id: &str) -> Result<u32> {
        let inner = self.lock();
        let from_messages = inner
            .messages
            .values()
            .filter(|m| m.account_id == account_id)
            .filter_map(|m| m.key_version);
        let from_verifiers = inner
            .verifiers
            .iter()
            .filter(|((account, _), _)| account == account_id)
            .map(|(_, (version, _))| *version);
        Ok(from_messages.chain(from_verifiers).max().unwrap_or(0))
    }

    fn delete_account(&self, account_id: &str) -> Result<usize> {
        let mut inner = self.lock();
        let before = inner.messages.len();
        inner.messages.retain(|_, m| m.account_id != account_id);
        inner.verifiers.retain(|(account, _), _| account != account_id);
        Ok(before - inner.messages.len())
    }
}
