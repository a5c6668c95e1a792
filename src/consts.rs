// src/consts.rs
//! Shared constants: security parameters and defaults

/// Argon2id memory cost in KiB for newly created verifiers (64 MiB)
pub const DEFAULT_KDF_MEMORY_KIB: u32 = 64 * 1024;

/// Argon2id passes for newly created verifiers
pub const DEFAULT_KDF_ITERATIONS: u32 = 3;

/// Argon2id lanes for newly created verifiers
pub const DEFAULT_KDF_PARALLELISM: u32 = 1;

/// Smallest parameters accepted when `fast_kdf` is enabled (tests, dev boxes)
pub const FAST_KDF_MEMORY_KIB: u32 = 64;
pub const FAST_KDF_ITERATIONS: u32 = 1;

/// Largest Argon2id costs accepted from a stored verifier or config (1 GiB,
/// 16 passes, 8 lanes); anything above is treated as a damaged record
pub const MAX_KDF_MEMORY_KIB: u32 = 1024 * 1024;
pub const MAX_KDF_ITERATIONS: u32 = 16;
pub const MAX_KDF_PARALLELISM: u32 = 8;

/// Per-account salt length in bytes
pub const SALT_LEN: usize = 16;

/// Length of the public key commitment
pub const COMMITMENT_LEN: usize = 32;

/// XChaCha20-Poly1305 nonce length
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length
pub const TAG_LEN: usize = 16;

/// Leading byte of every sealed message body
pub const SEALED_FORMAT_V1: u8 = 0x01;

/// BLAKE3 derivation context for the message sealing key
pub const MESSAGE_KEY_CONTEXT: &str = "message-keyring 2026-01 message sealing key";

/// BLAKE3 derivation context for the verifier key
pub const VERIFIER_KEY_CONTEXT: &str = "message-keyring 2026-01 password verifier key";

/// Domain label mixed into the commitment input
pub const COMMITMENT_LABEL: &[u8] = b"message-keyring verifier";

/// Default idle timeout before session keys are dropped (30 minutes)
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30 * 60;

/// Default SQLite file name under the platform data directory
pub const DEFAULT_MESSAGE_DB_FILE: &str = "message-keyring/messages.db";

/// Export document format identifier
pub const EXPORT_FORMAT: &str = "message-keyring-export-v1";
