// src/lib.rs
//! message-keyring: password-derived encryption for stored messages
//!
//! Features:
//! - Argon2id key derivation at sign-in, keys held only in memory
//! - XChaCha20-Poly1305 sealed message bodies bound to account and key version
//! - Resumable, cancellable re-encryption on password change
//! - One-time migration of legacy plaintext messages
//! - SQLite or in-memory message store behind one trait

pub mod aliases;
pub mod config;
pub mod consts;
pub mod core;
pub mod db;
pub mod enums;
pub mod error;
pub mod export;
pub mod inbox;
pub mod manager;
pub mod progress;
pub mod rotate_keys;
pub mod session;

// Re-export everything users need at the crate root
pub use aliases::{CypherText, MessageKey32, Password, PlainText};
pub use config::load as load_config;
pub use crate::core::{
    derive_key_material, KdfParams, KeyVerifier, Result as CoreResult, SessionKeyMaterial,
};
pub use db::{MemoryStore, MessageStore, SqliteStore, StoredMessage};
pub use enums::{EncryptionState, InitReason, MigrationKind, VerifierSlot};
pub use error::CoreError;
pub use export::export_to_json;
pub use inbox::{Inbox, OpenedMessage};
pub use manager::{EncryptionManager, SignInOutcome};
pub use progress::{CancelToken, Progress};
pub use rotate_keys::{PasswordChangeResult, ReencryptionReport};
pub use session::KeySession;
