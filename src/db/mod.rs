// src/db/mod.rs
//! Message persistence: the store trait and its in-memory and SQLite backends

pub mod memory;
pub mod message_db_conn;
pub mod message_db_ops;
pub mod store;

pub use memory::MemoryStore;
pub use message_db_conn::{open_configured_message_db, open_message_db};
pub use message_db_ops::{SqliteStore, VerifierHistoryEntry};
pub use store::{MessageStore, StoredMessage};
