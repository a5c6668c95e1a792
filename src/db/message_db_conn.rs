// src/db/message_db_conn.rs
use rusqlite::{Connection, Result};
use std::{fs, path::Path};

/// Open (and migrate) the message database at the configured path
pub fn open_configured_message_db() -> Result<Connection> {
    let config = crate::config::load();
    open_message_db(&config.paths.message_db)
}

/// Open (and migrate) the message database at `db_path`
pub fn open_message_db(db_path: impl AsRef<Path>) -> Result<Connection> {
    if let Some(parent) = db_path.as_ref().parent() {
        let _ = fs::create_dir_all(parent);
    }

    let conn = Connection::open(db_path)?;
    migrate(&conn)?;
    Ok(conn)
}

/// In-memory database with the full schema
pub fn open_memory_message_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    migrate(&conn)?;
    Ok(conn)
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id  TEXT NOT NULL,
            key_version INTEGER,            -- NULL = legacy plaintext
            body        BLOB NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_account ON messages(account_id, id);

        CREATE TABLE IF NOT EXISTS key_verifiers (
            account_id TEXT NOT NULL,
            slot       TEXT NOT NULL CHECK (slot IN ('current', 'pending')),
            version    INTEGER NOT NULL,
            record     TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (account_id, slot)
        );

        CREATE TABLE IF NOT EXISTS verifier_history (
            account_id    TEXT NOT NULL,
            version       INTEGER NOT NULL,
            record        TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            superseded_at TEXT,
            note          TEXT,
            PRIMARY KEY (account_id, version)
        );

        CREATE INDEX IF NOT EXISTS idx_verifier_history_account ON verifier_history(account_id);
        "#,
    )
}
