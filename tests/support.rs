// tests/support.rs
//! Shared fixtures: fast-KDF managers, a fault-injecting store, tracing setup

#![allow(dead_code)] // each test binary uses a different subset

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use message_keyring::core::KeyVerifier;
use message_keyring::enums::VerifierSlot;
use message_keyring::{
    CoreError, CoreResult, EncryptionManager, KdfParams, MemoryStore, MessageStore, Password,
    StoredMessage,
};

/// Minimal tracing init – only active when the `logging` feature is enabled
#[cfg(feature = "logging")]
pub fn init_tracing() {
    use tracing_subscriber::prelude::*;
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init_tracing() {}

pub const ACCOUNT: &str = "alice";

pub fn pw(s: &str) -> Password {
    Password::new(s.to_owned())
}

pub fn manager() -> EncryptionManager<MemoryStore> {
    EncryptionManager::new(MemoryStore::new(), KdfParams::fast(), None)
}

pub fn manager_on<S: MessageStore>(store: Arc<S>) -> EncryptionManager<S> {
    EncryptionManager::with_shared_store(store, KdfParams::fast(), None)
}

/// Sign in and post `count` messages named `message 0..count`
pub fn seeded<S: MessageStore>(manager: &EncryptionManager<S>, password: &str, count: usize) {
    manager.sign_in(ACCOUNT, pw(password)).unwrap();
    let inbox = manager.inbox();
    for i in 0..count {
        inbox.post_message(format!("message {i}").as_bytes()).unwrap();
    }
}

/// Decrypted bodies of the signed-in account, in id order
pub fn texts<S: MessageStore>(manager: &EncryptionManager<S>) -> Vec<String> {
    manager
        .inbox()
        .read_messages()
        .unwrap()
        .iter()
        .map(|m| m.text().unwrap().to_owned())
        .collect()
}

pub fn expected_texts(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("message {i}")).collect()
}

/// A [`MemoryStore`] that fails `write_ciphertext` for chosen ids and counts
/// successful writes per message
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<i64>>,
    writes: Mutex<HashMap<i64, usize>>,
    scans: Mutex<usize>,
    slipped: Mutex<Option<SlippedRow>>,
}

/// A row inserted right before a given version scan, as if posted concurrently
struct SlippedRow {
    scan: usize,
    account_id: String,
    key_version: u32,
    body: Vec<u8>,
    fail_writes: bool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_for(&self, message_id: i64) {
        self.failing.lock().unwrap().insert(message_id);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn writes_for(&self, message_id: i64) -> usize {
        self.writes
            .lock()
            .unwrap()
            .get(&message_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_writes(&self) -> usize {
        self.writes.lock().unwrap().values().sum()
    }

    /// Insert `body` at `key_version` just before the `scan`-th version scan
    /// (1-based); with `fail_writes` every rewrite of that row fails.
    pub fn slip_in_before_scan(
        &self,
        scan: usize,
        key_version: u32,
        body: Vec<u8>,
        fail_writes: bool,
    ) {
        *self.slipped.lock().unwrap() = Some(SlippedRow {
            scan,
            account_id: ACCOUNT.to_owned(),
            key_version,
            body,
            fail_writes,
        });
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }
}

impl MessageStore for FlakyStore {
    fn messages_for_account(&self, account_id: &str) -> CoreResult<Vec<StoredMessage>> {
        self.inner.messages_for_account(account_id)
    }

    fn insert_message(
        &self,
        account_id: &str,
        key_version: Option<u32>,
        body: &[u8],
    ) -> CoreResult<i64> {
        self.inner.insert_message(account_id, key_version, body)
    }

    fn write_ciphertext(&self, message_id: i64, key_version: u32, body: &[u8]) -> CoreResult<()> {
        if self.failing.lock().unwrap().contains(&message_id) {
            return Err(CoreError::Store(format!(
                "injected failure for message {message_id}"
            )));
        }
        *self.writes.lock().unwrap().entry(message_id).or_default() += 1;
        self.inner.write_ciphertext(message_id, key_version, body)
    }

    fn load_verifier(
        &self,
        account_id: &str,
        slot: VerifierSlot,
    ) -> CoreResult<Option<KeyVerifier>> {
        self.inner.load_verifier(account_id, slot)
    }

    fn store_verifier(
        &self,
        account_id: &str,
        slot: VerifierSlot,
        verifier: &KeyVerifier,
    ) -> CoreResult<()> {
        self.inner.store_verifier(account_id, slot, verifier)
    }

    fn promote_pending_verifier(&self, account_id: &str) -> CoreResult<()> {
        self.inner.promote_pending_verifier(account_id)
    }

    fn discard_verifier(&self, account_id: &str, slot: VerifierSlot) -> CoreResult<()> {
        self.inner.discard_verifier(account_id, slot)
    }

    fn max_key_version(&self, account_id: &str) -> CoreResult<u32> {
        self.inner.max_key_version(account_id)
    }

    fn delete_account(&self, account_id: &str) -> CoreResult<usize> {
        self.inner.delete_account(account_id)
    }

    fn messages_with_version(
        &self,
        account_id: &str,
        key_version: Option<u32>,
    ) -> CoreResult<Vec<StoredMessage>> {
        if key_version.is_some() {
            let mut scans = self.scans.lock().unwrap();
            *scans += 1;
            let mut slipped = self.slipped.lock().unwrap();
            if slipped.as_ref().is_some_and(|row| row.scan == *scans) {
                if let Some(row) = slipped.take() {
                    let id = self.inner.insert_message(
                        &row.account_id,
                        Some(row.key_version),
                        &row.body,
                    )?;
                    if row.fail_writes {
                        self.failing.lock().unwrap().insert(id);
                    }
                }
            }
        }
        self.inner.messages_with_version(account_id, key_version)
    }
}
