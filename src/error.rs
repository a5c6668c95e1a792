// src/error.rs
//! Public error type for the entire crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// The old password did not match the stored verifier. Nothing was written.
    #[error("current password does not match the stored key verifier")]
    InvalidCredentialsForReencryption,

    #[error("key derivation failed: {0}")]
    KeyDerivationFailure(String),

    #[error("failed to re-encrypt message {message_id}: {source}")]
    ReencryptionWriteFailure {
        message_id: i64,
        #[source]
        source: Box<CoreError>,
    },

    /// No session key is held; the user has to sign in again.
    #[error("no key material in session, re-authentication required")]
    NoKeyMaterial,

    #[error("a password change is already running for this session")]
    PasswordChangeInProgress,

    #[error("a sign-in is already running for this session")]
    SignInInProgress,

    /// An interrupted change exists and the new password is not the one it was started with.
    #[error("new password does not match the interrupted password change")]
    PendingChangeMismatch,

    #[error("stored key verifier is unreadable: {0}")]
    CorruptVerifier(String),

    #[error("message encryption failed")]
    Encrypt,

    #[error("message decryption failed (wrong key or tampered ciphertext)")]
    Decrypt,

    #[error("message store error: {0}")]
    Store(String),
}

impl CoreError {
    /// True for errors that leave the session without usable keys.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, CoreError::NoKeyMaterial)
    }
}
