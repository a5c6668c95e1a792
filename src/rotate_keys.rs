// src/rotate_keys.rs
//! The re-encryption pass shared by password change and legacy migration
//!
//! Messages are processed one at a time in ascending id order. Each message
//! is re-sealed and written on its own, so a failure or a cancellation leaves
//! every earlier message durably rewritten and every later one untouched.
//! After the initial listing the store is re-scanned for rows that still carry
//! the source version (messages posted while the pass ran) until none remain.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::aliases::CypherText;
use crate::core::Result;
use crate::db::store::{MessageStore, StoredMessage};
use crate::error::CoreError;
use crate::progress::{CancelToken, Progress};

/// Outcome of one re-encryption pass
#[derive(Debug, Default)]
pub struct ReencryptionReport {
    /// True when every message was rewritten and the pass was not cancelled
    pub success: bool,
    pub messages_re_encrypted: usize,
    /// Messages that needed rewriting in this run
    pub total: usize,
    pub cancelled: bool,
    /// One [`CoreError::ReencryptionWriteFailure`] per message that was left as it was
    pub failures: Vec<CoreError>,
}

/// Result of a password change
pub type PasswordChangeResult = ReencryptionReport;

impl ReencryptionReport {
    pub fn failed_message_ids(&self) -> Vec<i64> {
        self.failures
            .iter()
            .filter_map(|e| match e {
                CoreError::ReencryptionWriteFailure { message_id, .. } => Some(*message_id),
                _ => None,
            })
            .collect()
    }

    /// Fold a follow-up pass into this report
    pub(crate) fn absorb(&mut self, later: ReencryptionReport) {
        self.messages_re_encrypted += later.messages_re_encrypted;
        self.total += later.total;
        self.cancelled |= later.cancelled;
        self.failures.extend(later.failures);
        self.success = self.success && later.success;
    }
}

/// Re-seal every message of `account_id` whose key version is `source_version`.
///
/// `reseal` turns one stored message into `(target_version, new_body)`; the pass
/// writes the result. Progress is reported after every message, and `cancel` is
/// checked before each one.
pub fn reencrypt_messages<S: MessageStore + ?Sized>(
    store: &S,
    account_id: &str,
    source_version: Option<u32>,
    cancel: &CancelToken,
    on_progress: &mut dyn FnMut(Progress),
    reseal: &mut dyn FnMut(&StoredMessage) -> Result<(u32, CypherText)>,
) -> Result<ReencryptionReport> {
    let mut report = ReencryptionReport::default();
    let mut attempted: HashSet<i64> = HashSet::new();
    let mut current = 0;

    'sweep: loop {
        let batch: Vec<StoredMessage> = store
            .messages_with_version(account_id, source_version)?
            .into_iter()
            .filter(|m| !attempted.contains(&m.id))
            .collect();
        if batch.is_empty() {
            break;
        }
        report.total += batch.len();
        debug!(account_id, batch = batch.len(), "re-encryption batch");

        for message in batch {
            if cancel.is_cancelled() {
                info!(account_id, done = current, "re-encryption cancelled");
                report.cancelled = true;
                break 'sweep;
            }
            attempted.insert(message.id);

            let written = reseal(&message).and_then(|(version, body)| {
                store.write_ciphertext(message.id, version, body.expose_secret())
            });
            match written {
                Ok(()) => report.messages_re_encrypted += 1,
                Err(err) => {
                    warn!(
                        account_id,
                        message_id = message.id,
                        error = %err,
                        "message left under its previous key"
                    );
                    report.failures.push(CoreError::ReencryptionWriteFailure {
                        message_id: message.id,
                        source: Box::new(err),
                    });
                }
            }

            current += 1;
            on_progress(Progress {
                current,
                total: report.total,
            });
        }
    }

    report.success = !report.cancelled && report.failures.is_empty();
    Ok(report)
}
