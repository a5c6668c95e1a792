// src/export/mod.rs
//! Export utilities for message-keyring
//!
//! Exports contain decrypted message bodies. Whoever holds the file can read them.

pub use json::export_to_json;

pub mod json;
