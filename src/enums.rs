// src/enums.rs
//! Public enum types used throughout the crate
//!
//! Central location for the tagged states reported to the sign-in flow
//! and the storage slot names for key verifiers.

use serde::{Deserialize, Serialize};

/// Encryption state of an account as seen by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionState {
    /// Keys are held and every stored message is sealed under a known key.
    Ready,
    /// Keys are held but some stored content still needs re-sealing.
    MigrationRequired(MigrationKind),
    /// No usable key commitment existed (or could be checked) for the account.
    InitializationRequired(InitReason),
}

impl EncryptionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, EncryptionState::Ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationKind {
    /// Unencrypted messages from before encryption was introduced
    LegacyPlaintext { messages: usize },
    /// A password change stopped part way; both verifiers are still stored
    InterruptedPasswordChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitReason {
    /// No verifier had ever been stored; a fresh one was written
    FirstSignIn,
    /// The stored verifier could not be parsed; a fresh one was written
    VerifierUnreadable,
    /// The password matched no stored verifier; nothing was written
    VerifierMismatch,
    /// Argon2 failed; nothing was written, retrying is safe
    DerivationFailed,
}

impl InitReason {
    /// Whether the session holds keys after reporting this reason.
    pub fn keys_installed(&self) -> bool {
        matches!(self, InitReason::FirstSignIn | InitReason::VerifierUnreadable)
    }
}

/// Storage slot of a key verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierSlot {
    Current,
    Pending,
}

impl VerifierSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifierSlot::Current => "current",
            VerifierSlot::Pending => "pending",
        }
    }
}
