// src/aliases.rs
//! Re-exports secure-gate's secret containers
//!
//! These are the canonical secret types used throughout message-keyring.
//! Every one of them zeroizes its contents on drop.

pub use secure_gate::{dynamic_alias, fixed_alias};

// Fixed-size secrets
fixed_alias!(MessageKey32, 32); // per-account message sealing key

// Dynamic secrets
dynamic_alias!(Password, String); // plaintext password, consumed by key derivation
dynamic_alias!(PlainText, Vec<u8>);
dynamic_alias!(CypherText, Vec<u8>);
