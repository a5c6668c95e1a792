// src/bin/keyring.rs
//! keyring: command-line front end over the configured SQLite message store
//!
//! Keys live only in memory, so every command signs in first.
//!
//! ```text
//! keyring sign-in <account>
//! keyring change-password <account>
//! keyring post <account> <text>
//! keyring read <account>
//! keyring export <account> <out.json>
//! keyring erase <account>
//! ```

use std::io::Write;

use anyhow::{bail, Context, Result};
use message_keyring::db::open_configured_message_db;
use message_keyring::{
    export_to_json, load_config, EncryptionManager, EncryptionState, MigrationKind, Password,
    Progress, SqliteStore,
};
use rpassword::prompt_password;
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, account) = match args.as_slice() {
        [command, account, ..] => (command.as_str(), account.as_str()),
        _ => bail!(
            "usage: keyring <sign-in|change-password|post|read|export|erase> <account> [args]"
        ),
    };
    let rest = &args[2..];

    let config = load_config();
    let conn = open_configured_message_db().with_context(|| {
        format!("failed to open message db {}", config.paths.message_db.display())
    })?;
    let store = SqliteStore::from_connection(conn);
    let manager = EncryptionManager::from_config(store, config);

    let password = Password::new(prompt_password(format!("Password for {account}: "))?);
    let outcome = manager.sign_in(account, password)?;
    info!(state = ?outcome.state, "signed in");
    if matches!(
        outcome.state,
        EncryptionState::InitializationRequired(reason) if !reason.keys_installed()
    ) {
        bail!("no keys for {account}: {:?}", outcome.state);
    }

    match command {
        "sign-in" => {
            if outcome.state.is_ready() {
                println!("ready");
            } else if let EncryptionState::MigrationRequired(MigrationKind::LegacyPlaintext {
                messages,
            }) = outcome.state
            {
                println!("sealing {messages} legacy message(s)");
                let report = manager.migrate_legacy(print_progress)?;
                println!();
                println!(
                    "sealed {}/{} legacy message(s)",
                    report.messages_re_encrypted, report.total
                );
            } else if let EncryptionState::MigrationRequired(kind) = outcome.state {
                println!("{kind:?}: run change-password with the same passwords to finish");
            } else {
                println!("keys created: {:?}", outcome.state);
            }
        }
        "change-password" => {
            let old = Password::new(prompt_password("Current password: ")?);
            let new = Password::new(prompt_password("New password: ")?);
            let confirm = Password::new(prompt_password("Repeat new password: ")?);
            if new.expose_secret() != confirm.expose_secret() {
                bail!("new passwords do not match");
            }
            drop(confirm);

            let report = manager.change_password(old, new, print_progress)?;
            println!();
            if report.success {
                println!("re-encrypted {} message(s)", report.messages_re_encrypted);
            } else {
                println!(
                    "incomplete: {} re-encrypted, failed ids {:?}; run again to resume",
                    report.messages_re_encrypted,
                    report.failed_message_ids()
                );
            }
        }
        "post" => {
            let text = rest.join(" ");
            if text.is_empty() {
                bail!("nothing to post");
            }
            let id = manager.inbox().post_message(text.as_bytes())?;
            println!("posted message {id}");
        }
        "read" => {
            for message in manager.inbox().read_messages()? {
                let marker = if message.legacy { " (legacy)" } else { "" };
                let shown = match (message.is_readable(), message.text()) {
                    (false, _) => "<no key for this message>",
                    (true, Some(text)) => text,
                    (true, None) => "<binary>",
                };
                println!("#{} {}{marker}: {shown}", message.id, message.created_at);
            }
        }
        "export" => {
            let out = rest.first().context("export needs an output path")?;
            let count = export_to_json(&manager.inbox(), out)?;
            println!("exported {count} message(s) to {out}");
            println!("This file holds decrypted messages. Protect or delete it.");
        }
        "erase" => {
            let deleted = manager.erase_account()?;
            println!("erased {deleted} message(s)");
        }
        other => bail!("unknown command {other}"),
    }

    manager.sign_out();
    Ok(())
}

fn print_progress(progress: Progress) {
    print!("\r{}/{}", progress.current, progress.total);
    let _ = std::io::stdout().flush();
}
