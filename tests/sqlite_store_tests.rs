// tests/sqlite_store_tests.rs
//! SQLite-backed store: persistence across reopen, verifier history

mod support;

use std::sync::Arc;

use message_keyring::enums::VerifierSlot;
use message_keyring::{EncryptionState, MessageStore, SqliteStore};
use rusqlite::params;
use support::{expected_texts, init_tracing, manager_on, pw, seeded, texts, ACCOUNT};
use tempfile::tempdir;

#[test]
fn messages_and_keys_survive_reopen() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("messages.db");

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let manager = manager_on(store);
        seeded(&manager, "hunter2", 3);
        manager.sign_out();
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let manager = manager_on(Arc::clone(&store));
    let outcome = manager.sign_in(ACCOUNT, pw("hunter2")).unwrap();
    assert_eq!(outcome.state, EncryptionState::Ready);
    assert_eq!(texts(&manager), expected_texts(3));
    assert_eq!(store.max_key_version(ACCOUNT).unwrap(), 1);
}

#[test]
fn legacy_rows_are_found_by_null_version() {
    init_tracing();
    let store = SqliteStore::open_in_memory().unwrap();
    let legacy = store.insert_message(ACCOUNT, None, b"plain").unwrap();
    let sealed = store.insert_message(ACCOUNT, Some(1), b"\x01sealed").unwrap();
    store.insert_message("bob", None, b"other").unwrap();

    assert_eq!(store.count_legacy(ACCOUNT).unwrap(), 1);
    let rows = store.messages_with_version(ACCOUNT, None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, legacy);
    assert!(rows[0].is_legacy());

    let rows = store.messages_with_version(ACCOUNT, Some(1)).unwrap();
    assert_eq!(rows[0].id, sealed);

    store.write_ciphertext(legacy, 1, b"\x01now sealed").unwrap();
    assert_eq!(store.count_legacy(ACCOUNT).unwrap(), 0);
    assert!(store.write_ciphertext(9999, 1, b"x").is_err());
}

#[test]
fn password_change_records_verifier_history() {
    init_tracing();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let manager = manager_on(Arc::clone(&store));
    seeded(&manager, "old", 4);

    let report = manager.change_password(pw("old"), pw("new"), |_| {}).unwrap();
    assert!(report.success);

    let history = store.verifier_history(ACCOUNT).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].version, 1);
    assert_eq!(history[0].note.as_deref(), Some("initial"));
    assert!(history[0].superseded_at.is_some());
    assert_eq!(history[1].version, 2);
    assert_eq!(history[1].note.as_deref(), Some("rotation"));
    assert!(history[1].superseded_at.is_none());

    assert!(store
        .load_verifier(ACCOUNT, VerifierSlot::Pending)
        .unwrap()
        .is_none());
    assert_eq!(
        store
            .load_verifier(ACCOUNT, VerifierSlot::Current)
            .unwrap()
            .unwrap()
            .version(),
        2
    );
}

#[test]
fn damaged_verifier_row_triggers_reinitialization() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("messages.db");

    {
        let manager = manager_on(Arc::new(SqliteStore::open(&path).unwrap()));
        seeded(&manager, "hunter2", 1);
    }
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE key_verifiers SET record = ?1 WHERE account_id = ?2",
            params!["{\"version\":1}", ACCOUNT],
        )
        .unwrap();
    }

    let manager = manager_on(Arc::new(SqliteStore::open(&path).unwrap()));
    let outcome = manager.sign_in(ACCOUNT, pw("hunter2")).unwrap();
    assert_eq!(
        outcome.state,
        EncryptionState::InitializationRequired(
            message_keyring::InitReason::VerifierUnreadable
        )
    );
    assert_eq!(manager.session().active_version(), Some(2));
}

#[test]
fn discarded_pending_verifier_is_closed_in_history() {
    init_tracing();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let manager = manager_on(Arc::clone(&store));
    seeded(&manager, "old", 2);
    manager
        .change_password(pw("old"), pw("new"), |_| manager.cancel_in_flight())
        .unwrap();
    assert!(store
        .load_verifier(ACCOUNT, VerifierSlot::Pending)
        .unwrap()
        .is_some());

    store.discard_verifier(ACCOUNT, VerifierSlot::Pending).unwrap();

    assert!(store
        .load_verifier(ACCOUNT, VerifierSlot::Pending)
        .unwrap()
        .is_none());
    let history = store.verifier_history(ACCOUNT).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].superseded_at.is_none());
    assert_eq!(history[1].version, 2);
    assert_eq!(history[1].note.as_deref(), Some("discarded"));
    assert!(history[1].superseded_at.is_some());
}

#[test]
fn erase_removes_history_too() {
    init_tracing();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let manager = manager_on(Arc::clone(&store));
    seeded(&manager, "hunter2", 2);

    assert_eq!(manager.erase_account().unwrap(), 2);
    assert!(store.verifier_history(ACCOUNT).unwrap().is_empty());
    assert_eq!(store.max_key_version(ACCOUNT).unwrap(), 0);
}
