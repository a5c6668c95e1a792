// src/inbox.rs
//! Messaging layer: the only consumer of session keys besides the manager
//!
//! Every call borrows key material from the injected [`KeySession`]; with no
//! session (never signed in, signed out, idle expired) every call fails with
//! [`CoreError::NoKeyMaterial`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::aliases::{CypherText, PlainText};
use crate::core::crypto::{open_message, seal_message};
use crate::core::Result;
use crate::db::store::{MessageStore, StoredMessage};
use crate::error::CoreError;
use crate::session::KeySession;

/// A stored message as handed to the UI
pub struct OpenedMessage {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    /// Stored as plaintext from before encryption was enabled
    pub legacy: bool,
    pub key_version: Option<u32>,
    /// `None` when no key held by the session opens this row
    pub body: Option<PlainText>,
}

impl OpenedMessage {
    pub fn is_readable(&self) -> bool {
        self.body.is_some()
    }

    /// Body as UTF-8 text, if it was opened and is text
    pub fn text(&self) -> Option<&str> {
        let body = self.body.as_ref()?;
        std::str::from_utf8(body.expose_secret()).ok()
    }
}

pub struct Inbox<S: MessageStore> {
    session: KeySession,
    store: Arc<S>,
}

impl<S: MessageStore> Clone for Inbox<S> {
    fn clone(&self) -> Self {
        Inbox {
            session: self.session.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: MessageStore> Inbox<S> {
    pub fn new(session: KeySession, store: Arc<S>) -> Self {
        Inbox { session, store }
    }

    pub fn account_id(&self) -> Result<String> {
        self.session.account_id().ok_or(CoreError::NoKeyMaterial)
    }

    /// Seal `body` under the active key and store it. Returns the message id.
    pub fn post_message(&self, body: &[u8]) -> Result<i64> {
        // Sealing and inserting under one session lock keeps a concurrent key
        // swap from slipping in between.
        self.session.with_active_key(|account_id, key| {
            let sealed = seal_message(key, account_id, body)?;
            self.store
                .insert_message(account_id, Some(key.version()), sealed.expose_secret())
        })
    }

    /// Seal without storing
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(u32, CypherText)> {
        self.session.with_active_key(|account_id, key| {
            Ok((key.version(), seal_message(key, account_id, plaintext)?))
        })
    }

    /// Open one stored row with whichever session key sealed it
    pub fn decrypt(&self, message: &StoredMessage) -> Result<PlainText> {
        match message.key_version {
            None => {
                // legacy rows are readable without a key, but only inside a session
                let account_id = self.account_id()?;
                if account_id != message.account_id {
                    return Err(CoreError::Decrypt);
                }
                Ok(PlainText::new(message.body.clone()))
            }
            Some(version) => self.session.with_key_for_version(version, |account_id, key| {
                if account_id != message.account_id {
                    return Err(CoreError::Decrypt);
                }
                open_message(key, account_id, &message.body)
            }),
        }
    }

    /// Every message of the signed-in account, oldest first.
    ///
    /// Rows sealed under a key version the session does not hold (a lost
    /// verifier, or the unrotated part of an interrupted change) come back
    /// with no body; they do not hide the rows that can be opened.
    pub fn read_messages(&self) -> Result<Vec<OpenedMessage>> {
        let account_id = self.account_id()?;
        let mut unreadable = 0usize;
        let opened = self
            .store
            .messages_for_account(&account_id)?
            .iter()
            .map(|message| {
                let body = match self.decrypt(message) {
                    Ok(body) => Some(body),
                    Err(CoreError::Decrypt) => {
                        unreadable += 1;
                        None
                    }
                    Err(err) => return Err(err),
                };
                Ok(OpenedMessage {
                    id: message.id,
                    created_at: message.created_at,
                    legacy: message.is_legacy(),
                    key_version: message.key_version,
                    body,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if unreadable > 0 {
            debug!(
                account_id = %account_id,
                unreadable,
                "messages not openable with session keys"
            );
        }
        Ok(opened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::Password;
    use crate::core::kdf::{derive_key_material, KdfParams};
    use crate::db::MemoryStore;
    use crate::enums::EncryptionState;

    fn signed_in(store: Arc<MemoryStore>) -> Inbox<MemoryStore> {
        let key = derive_key_material(
            &Password::new("pw".to_owned()),
            "alice",
            1,
            &[9; 16],
            &KdfParams::fast(),
        )
        .unwrap();
        let session = KeySession::new();
        session.install("alice", key, EncryptionState::Ready, None);
        Inbox::new(session, store)
    }

    #[test]
    fn posted_messages_are_stored_sealed() {
        let store = Arc::new(MemoryStore::new());
        let inbox = signed_in(Arc::clone(&store));

        let id = inbox.post_message(b"meet at noon").unwrap();
        let row = store.message(id).unwrap();
        assert_eq!(row.key_version, Some(1));
        assert!(!row
            .body
            .windows(b"meet at noon".len())
            .any(|w| w == b"meet at noon"));

        let read = inbox.read_messages().unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].text(), Some("meet at noon"));
        assert!(!read[0].legacy);
    }

    #[test]
    fn legacy_rows_read_as_is() {
        let store = Arc::new(MemoryStore::new());
        store.insert_message("alice", None, b"old").unwrap();
        let inbox = signed_in(Arc::clone(&store));

        let read = inbox.read_messages().unwrap();
        assert!(read[0].legacy);
        assert_eq!(read[0].text(), Some("old"));
    }

    #[test]
    fn body_moved_to_another_account_does_not_open() {
        let store = Arc::new(MemoryStore::new());
        let inbox = signed_in(Arc::clone(&store));
        let (version, sealed) = inbox.encrypt(b"secret").unwrap();

        let forged = StoredMessage {
            id: 99,
            account_id: "alice".into(),
            key_version: Some(version),
            body: sealed.expose_secret().clone(),
            created_at: Utc::now(),
        };
        assert_eq!(inbox.decrypt(&forged).unwrap().expose_secret(), b"secret");

        let moved = StoredMessage {
            account_id: "bob".into(),
            ..forged
        };
        assert!(matches!(inbox.decrypt(&moved), Err(CoreError::Decrypt)));
    }

    #[test]
    fn rows_under_unknown_versions_do_not_block_reading() {
        let store = Arc::new(MemoryStore::new());
        let lost = store
            .insert_message("alice", Some(7), b"\x01sealed elsewhere")
            .unwrap();
        let inbox = signed_in(Arc::clone(&store));
        inbox.post_message(b"still here").unwrap();

        let read = inbox.read_messages().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].id, lost);
        assert!(!read[0].is_readable());
        assert_eq!(read[0].key_version, Some(7));
        assert_eq!(read[1].text(), Some("still here"));
    }

    #[test]
    fn no_session_no_access() {
        let inbox = Inbox::new(KeySession::new(), Arc::new(MemoryStore::new()));
        assert!(matches!(inbox.post_message(b"x"), Err(CoreError::NoKeyMaterial)));
        assert!(matches!(inbox.read_messages(), Err(CoreError::NoKeyMaterial)));
    }
}
