// src/db/message_db_ops.rs
//! SQLite-backed message store
//!
//! Messages and verifiers live in one database. Every verifier ever written
//! is also appended to `verifier_history`; promotion of a pending verifier
//! stamps `superseded_at` on the one it replaces, all in one transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::verifier::KeyVerifier;
use crate::core::Result;
use crate::db::message_db_conn::{open_memory_message_db, open_message_db};
use crate::db::store::{MessageStore, StoredMessage};
use crate::enums::VerifierSlot;
use crate::error::CoreError;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// One row of `verifier_history`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierHistoryEntry {
    pub version: u32,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub superseded_at: Option<DateTime<Utc>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_connection(open_message_db(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(open_memory_message_db()?))
    }

    /// Wrap an already migrated connection
    pub fn from_connection(conn: Connection) -> Self {
        SqliteStore {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn verifier_history(&self, account_id: &str) -> Result<Vec<VerifierHistoryEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT version, note, created_at, superseded_at
             FROM verifier_history WHERE account_id = ?1 ORDER BY version",
        )?;
        let rows = stmt.query_map([account_id], |row| {
            Ok(VerifierHistoryEntry {
                version: row.get(0)?,
                note: row.get(1)?,
                created_at: row.get(2)?,
                superseded_at: row.get(3)?,
            })
        })?;
        let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(collected)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.get(0)?,
        account_id: row.get(1)?,
        key_version: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl MessageStore for SqliteStore {
    fn messages_for_account(&self, account_id: &str) -> Result<Vec<StoredMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, account_id, key_version, body, created_at
             FROM messages WHERE account_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([account_id], row_to_message)?;
        let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(collected)
    }

    fn messages_with_version(
        &self,
        account_id: &str,
        key_version: Option<u32>,
    ) -> Result<Vec<StoredMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, account_id, key_version, body, created_at
             FROM messages WHERE account_id = ?1 AND key_version IS ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![account_id, key_version], row_to_message)?;
        let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(collected)
    }

    fn count_legacy(&self, account_id: &str) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE account_id = ?1 AND key_version IS NULL",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn insert_message(
        &self,
        account_id: &str,
        key_version: Option<u32>,
        body: &[u8],
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO messages (account_id, key_version, body, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![account_id, key_version, body, Utc::now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn write_ciphertext(&self, message_id: i64, key_version: u32, body: &[u8]) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE messages SET body = ?1, key_version = ?2, updated_at = ?3 WHERE id = ?4",
            params![body, key_version, Utc::now(), message_id],
        )?;
        if updated == 0 {
            return Err(CoreError::Store(format!("no message with id {message_id}")));
        }
        Ok(())
    }

    fn load_verifier(&self, account_id: &str, slot: VerifierSlot) -> Result<Option<KeyVerifier>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT record FROM key_verifiers WHERE account_id = ?1 AND slot = ?2",
                params![account_id, slot.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|raw| KeyVerifier::from_json(&raw)).transpose()
    }

    fn store_verifier(
        &self,
        account_id: &str,
        slot: VerifierSlot,
        verifier: &KeyVerifier,
    ) -> Result<()> {
        let record = verifier.to_json()?;
        let now = Utc::now();
        let note = match slot {
            VerifierSlot::Current => "initial",
            VerifierSlot::Pending => "pending",
        };

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO key_verifiers (account_id, slot, version, record, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![account_id, slot.as_str(), verifier.version(), record, now],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO verifier_history (account_id, version, record, created_at, note)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![account_id, verifier.version(), record, now, note],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn promote_pending_verifier(&self, account_id: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let pending_version: Option<u32> = tx
            .query_row(
                "SELECT version FROM key_verifiers WHERE account_id = ?1 AND slot = 'pending'",
                [account_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(pending_version) = pending_version else {
            return Err(CoreError::Store(format!(
                "no pending verifier for {account_id}"
            )));
        };

        // Mark previous version as superseded
        tx.execute(
            "UPDATE verifier_history SET superseded_at = ?2
             WHERE account_id = ?1 AND version IN (
                 SELECT version FROM key_verifiers WHERE account_id = ?1 AND slot = 'current'
             )",
            params![account_id, Utc::now()],
        )?;
        tx.execute(
            "DELETE FROM key_verifiers WHERE account_id = ?1 AND slot = 'current'",
            [account_id],
        )?;
        tx.execute(
            "UPDATE key_verifiers SET slot = 'current' WHERE account_id = ?1 AND slot = 'pending'",
            [account_id],
        )?;
        tx.execute(
            "UPDATE verifier_history SET note = 'rotation' WHERE account_id = ?1 AND version = ?2",
            params![account_id, pending_version],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn discard_verifier(&self, account_id: &str, slot: VerifierSlot) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE verifier_history SET superseded_at = ?3, note = 'discarded'
             WHERE account_id = ?1 AND superseded_at IS NULL AND version IN (
                 SELECT version FROM key_verifiers WHERE account_id = ?1 AND slot = ?2
             )",
            params![account_id, slot.as_str(), Utc::now()],
        )?;
        tx.execute(
            "DELETE FROM key_verifiers WHERE account_id = ?1 AND slot = ?2",
            params![account_id, slot.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn max_key_version(&self, account_id: &str) -> Result<u32> {
        let max: Option<u32> = self.conn().query_row(
            "SELECT MAX(v) FROM (
                 SELECT MAX(key_version) AS v FROM messages WHERE account_id = ?1
                 UNION ALL
                 SELECT MAX(version) AS v FROM key_verifiers WHERE account_id = ?1
             )",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    fn delete_account(&self, account_id: &str) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM messages WHERE account_id = ?1", [account_id])?;
        tx.execute("DELETE FROM key_verifiers WHERE account_id = ?1", [account_id])?;
        tx.execute("DELETE FROM verifier_history WHERE account_id = ?1", [account_id])?;
        tx.commit()?;
        Ok(deleted)
    }
}
