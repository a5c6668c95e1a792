// src/config/mod.rs
//! Configuration system for message-keyring
//!
//! Central, lazy-loaded global config with TOML + env overrides.

pub use app::{load, Config, Features, Kdf, Paths, Session};

mod app;
mod defaults;
