// tests/export_tests.rs
//! JSON export of decrypted messages

mod support;

use std::sync::Arc;

use message_keyring::consts::EXPORT_FORMAT;
use message_keyring::{export_to_json, CoreError, MemoryStore, MessageStore};
use support::{init_tracing, manager, manager_on, pw, seeded, ACCOUNT};
use tempfile::tempdir;

#[test]
fn export_writes_every_message_decrypted() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    store.insert_message(ACCOUNT, None, b"from before").unwrap();
    let manager = manager_on(Arc::clone(&store));
    seeded(&manager, "hunter2", 2);
    manager.inbox().post_message(&[0xff, 0x00, 0xfe]).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("export.json");
    let count = export_to_json(&manager.inbox(), &path).unwrap();
    assert_eq!(count, 4);

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["export_format"], EXPORT_FORMAT);
    assert_eq!(doc["account_id"], ACCOUNT);
    assert_eq!(doc["total_messages"], 4);

    let messages = doc["messages"].as_array().unwrap();
    assert_eq!(messages[0]["body"], "from before");
    assert_eq!(messages[0]["legacy"], true);
    assert_eq!(messages[1]["body"], "message 0");
    assert_eq!(messages[2]["body"], "message 1");
    assert_eq!(messages[2]["legacy"], false);
    assert_eq!(messages[3]["body_base64url"], "_wD-");
    assert!(messages[3].get("body").is_none());
}

#[test]
fn export_needs_a_session() {
    init_tracing();
    let manager = manager();
    seeded(&manager, "hunter2", 1);
    manager.sign_out();

    let dir = tempdir().unwrap();
    let path = dir.path().join("export.json");
    let err = export_to_json(&manager.inbox(), &path).unwrap_err();
    assert!(matches!(err, CoreError::NoKeyMaterial));
    assert!(!path.exists());

    // a wrong password yields no session either
    manager.sign_in(ACCOUNT, pw("nope")).unwrap();
    assert!(matches!(
        export_to_json(&manager.inbox(), &path),
        Err(CoreError::NoKeyMaterial)
    ));
}

#[test]
fn rows_without_a_session_key_are_listed_without_a_body() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    store
        .insert_message(ACCOUNT, Some(9), b"\x01sealed under a lost key")
        .unwrap();
    let manager = manager_on(Arc::clone(&store));
    manager.sign_in(ACCOUNT, pw("hunter2")).unwrap();
    manager.inbox().post_message(b"readable").unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("export.json");
    assert_eq!(export_to_json(&manager.inbox(), &path).unwrap(), 2);

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let messages = doc["messages"].as_array().unwrap();
    assert_eq!(messages[0]["unreadable"], true);
    assert_eq!(messages[0]["key_version"], 9);
    assert!(messages[0].get("body").is_none());
    assert_eq!(messages[1]["body"], "readable");
}
