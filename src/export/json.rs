// src/export/json.rs
use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::consts::EXPORT_FORMAT;
use crate::core::Result;
use crate::db::store::MessageStore;
use crate::inbox::Inbox;

/// Export every message of the signed-in account, decrypted, to a JSON file.
///
/// UTF-8 bodies are written as `body`; anything else as `body_base64url`.
/// Rows the session holds no key for are listed with `"unreadable": true` and
/// their key version, without a body. Returns the number of exported messages.
pub fn export_to_json<S: MessageStore>(
    inbox: &Inbox<S>,
    path: impl AsRef<Path>,
) -> Result<usize> {
    let account_id = inbox.account_id()?;
    let opened = inbox.read_messages()?;

    let messages: Vec<_> = opened
        .iter()
        .map(|m| {
            let created_at = m.created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
            match (&m.body, m.text()) {
                (None, _) => json!({
                    "id": m.id,
                    "created_at": created_at,
                    "legacy": m.legacy,
                    "key_version": m.key_version,
                    "unreadable": true,
                }),
                (Some(_), Some(text)) => json!({
                    "id": m.id,
                    "created_at": created_at,
                    "legacy": m.legacy,
                    "body": text,
                }),
                (Some(body), None) => json!({
                    "id": m.id,
                    "created_at": created_at,
                    "legacy": m.legacy,
                    "body_base64url": URL_SAFE_NO_PAD.encode(body.expose_secret()),
                }),
            }
        })
        .collect();

    let export = json!({
        "export_format": EXPORT_FORMAT,
        "exported_at": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        "exporter_version": env!("CARGO_PKG_VERSION"),
        "account_id": account_id,
        "total_messages": messages.len(),
        "messages": messages,
    });

    let path = path.as_ref();
    std::fs::write(path, serde_json::to_string_pretty(&export)?)?;
    info!(
        account_id = %account_id,
        count = messages.len(),
        path = %path.display(),
        "messages exported"
    );
    Ok(messages.len())
}
