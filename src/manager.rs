// src/manager.rs
//! Password-derived encryption manager
//!
//! Entry points called by the authentication and account-settings flows:
//!
//! - [`EncryptionManager::sign_in`]: derive keys while the password is available
//! - [`EncryptionManager::change_password`]: rotate every stored message to a new key
//! - [`EncryptionManager::migrate_legacy`]: seal pre-encryption plaintext messages
//! - [`EncryptionManager::sign_out`]: drop key material
//!
//! Passwords arrive as owned [`Password`] values and are dropped as soon as the
//! last derivation that needs them has run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{info, warn};

use crate::aliases::{CypherText, Password};
use crate::config::Config;
use crate::core::crypto::{rotate_message, upgrade_from_legacy};
use crate::core::kdf::{KdfParams, SessionKeyMaterial};
use crate::core::verifier::KeyVerifier;
use crate::core::Result;
use crate::db::store::{MessageStore, StoredMessage};
use crate::enums::{EncryptionState, InitReason, MigrationKind, VerifierSlot};
use crate::error::CoreError;
use crate::inbox::Inbox;
use crate::progress::{CancelToken, Progress};
use crate::rotate_keys::{reencrypt_messages, PasswordChangeResult, ReencryptionReport};
use crate::session::KeySession;

/// Result of a sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInOutcome {
    pub account_id: String,
    pub state: EncryptionState,
}

/// Resets its flag when dropped, on every exit path
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool, busy: CoreError) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| busy)?;
        Ok(BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct EncryptionManager<S: MessageStore> {
    store: Arc<S>,
    session: KeySession,
    kdf: KdfParams,
    idle_timeout: Option<Duration>,
    sign_in_busy: AtomicBool,
    pass_busy: AtomicBool,
    in_flight: Mutex<Option<CancelToken>>,
}

impl<S: MessageStore> EncryptionManager<S> {
    pub fn new(store: S, kdf: KdfParams, idle_timeout: Option<Duration>) -> Self {
        Self::with_shared_store(Arc::new(store), kdf, idle_timeout)
    }

    pub fn with_shared_store(
        store: Arc<S>,
        kdf: KdfParams,
        idle_timeout: Option<Duration>,
    ) -> Self {
        EncryptionManager {
            store,
            session: KeySession::new(),
            kdf,
            idle_timeout,
            sign_in_busy: AtomicBool::new(false),
            pass_busy: AtomicBool::new(false),
            in_flight: Mutex::new(None),
        }
    }

    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(store, config.kdf_params(), config.idle_timeout())
    }

    /// The session context handed to the messaging layer
    pub fn session(&self) -> KeySession {
        self.session.clone()
    }

    pub fn inbox(&self) -> Inbox<S> {
        Inbox::new(self.session.clone(), Arc::clone(&self.store))
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn state(&self) -> Option<EncryptionState> {
        self.session.state()
    }

    // ── sign-in ───────────────────────────────────────────────────────────

    /// Derive and install key material for an account the auth service has just
    /// authenticated. Starts a new session, ending any previous one.
    pub fn sign_in(&self, account_id: &str, password: Password) -> Result<SignInOutcome> {
        let _busy = BusyGuard::acquire(&self.sign_in_busy, CoreError::SignInInProgress)?;
        self.sign_out();

        let legacy = self.store.count_legacy(account_id)?;
        match self.store.load_verifier(account_id, VerifierSlot::Current) {
            Ok(None) => self.initialize(account_id, password, legacy, InitReason::FirstSignIn),
            Ok(Some(current)) => self.unlock_existing(account_id, password, current, legacy),
            Err(CoreError::CorruptVerifier(reason)) => {
                warn!(account_id, %reason, "stored verifier unreadable");
                self.recover_unreadable(account_id, password, legacy)
            }
            Err(err) => Err(err),
        }
    }

    /// The current verifier is gone. A pending verifier that matches the
    /// password takes its place; otherwise a fresh one is written and the
    /// pending slot is dropped along with the old current one.
    fn recover_unreadable(
        &self,
        account_id: &str,
        password: Password,
        legacy: usize,
    ) -> Result<SignInOutcome> {
        if let Some(pending) = self.load_pending(account_id)? {
            let unlocked = match pending.unlock(&password, account_id) {
                Ok(unlocked) => unlocked,
                Err(err) => return derivation_failed(account_id, err),
            };
            if let Some(material) = unlocked {
                drop(password);
                self.store.promote_pending_verifier(account_id)?;
                warn!(
                    account_id,
                    version = material.version(),
                    "pending verifier promoted in place of the unreadable one"
                );
                let state = if legacy > 0 {
                    EncryptionState::MigrationRequired(MigrationKind::LegacyPlaintext {
                        messages: legacy,
                    })
                } else {
                    EncryptionState::InitializationRequired(InitReason::VerifierUnreadable)
                };
                return Ok(self.install(account_id, material, state));
            }
        }
        self.initialize(account_id, password, legacy, InitReason::VerifierUnreadable)
    }

    fn initialize(
        &self,
        account_id: &str,
        password: Password,
        legacy: usize,
        reason: InitReason,
    ) -> Result<SignInOutcome> {
        let version = self.store.max_key_version(account_id)? + 1;
        let created = KeyVerifier::create(&password, account_id, version, self.kdf);
        drop(password);

        let (verifier, material) = match created {
            Ok(pair) => pair,
            Err(err) => return derivation_failed(account_id, err),
        };
        self.store
            .store_verifier(account_id, VerifierSlot::Current, &verifier)?;
        if reason == InitReason::VerifierUnreadable {
            self.store.discard_verifier(account_id, VerifierSlot::Pending)?;
        }
        info!(
            account_id,
            version,
            fingerprint = %verifier.fingerprint(),
            ?reason,
            "key verifier created"
        );

        let state = if legacy > 0 {
            EncryptionState::MigrationRequired(MigrationKind::LegacyPlaintext { messages: legacy })
        } else {
            EncryptionState::InitializationRequired(reason)
        };
        Ok(self.install(account_id, material, state))
    }

    fn unlock_existing(
        &self,
        account_id: &str,
        password: Password,
        current: KeyVerifier,
        legacy: usize,
    ) -> Result<SignInOutcome> {
        let pending = self.load_pending(account_id)?;

        let unlocked = match current.unlock(&password, account_id) {
            Ok(unlocked) => unlocked,
            Err(err) => return derivation_failed(account_id, err),
        };
        if let Some(material) = unlocked {
            drop(password);
            let state = self.migration_state(legacy, pending.is_some());
            return Ok(self.install(account_id, material, state));
        }

        // The auth password may already be the new one of an interrupted change.
        if let Some(pending) = pending {
            let unlocked = match pending.unlock(&password, account_id) {
                Ok(unlocked) => unlocked,
                Err(err) => return derivation_failed(account_id, err),
            };
            if let Some(material) = unlocked {
                drop(password);
                warn!(account_id, "signed in with the new password of an interrupted change");
                let state = self.migration_state(legacy, true);
                return Ok(self.install(account_id, material, state));
            }
        }
        drop(password);

        warn!(account_id, "password does not match any stored key verifier");
        Ok(SignInOutcome {
            account_id: account_id.to_owned(),
            state: EncryptionState::InitializationRequired(InitReason::VerifierMismatch),
        })
    }

    fn install(
        &self,
        account_id: &str,
        material: SessionKeyMaterial,
        state: EncryptionState,
    ) -> SignInOutcome {
        info!(account_id, version = material.version(), ?state, "session keys installed");
        self.session
            .install(account_id, material, state, self.idle_timeout);
        SignInOutcome {
            account_id: account_id.to_owned(),
            state,
        }
    }

    /// A damaged pending slot is ignored; nothing sealed under it can be opened anyway
    fn load_pending(&self, account_id: &str) -> Result<Option<KeyVerifier>> {
        match self.store.load_verifier(account_id, VerifierSlot::Pending) {
            Err(CoreError::CorruptVerifier(reason)) => {
                warn!(account_id, %reason, "pending verifier unreadable, ignoring it");
                Ok(None)
            }
            other => other,
        }
    }

    fn migration_state(&self, legacy: usize, pending: bool) -> EncryptionState {
        if legacy > 0 {
            EncryptionState::MigrationRequired(MigrationKind::LegacyPlaintext { messages: legacy })
        } else if pending {
            EncryptionState::MigrationRequired(MigrationKind::InterruptedPasswordChange)
        } else {
            EncryptionState::Ready
        }
    }

    fn refresh_state(&self, account_id: &str) -> Result<()> {
        let legacy = self.store.count_legacy(account_id)?;
        let pending = self.load_pending(account_id)?.is_some();
        self.session
            .set_state(account_id, self.migration_state(legacy, pending));
        Ok(())
    }

    // ── password change ───────────────────────────────────────────────────

    /// Verify `old`, derive the key for `new` and re-encrypt every message
    /// sealed under the old key.
    ///
    /// A wrong `old` aborts with [`CoreError::InvalidCredentialsForReencryption`]
    /// before anything is written. Per-message failures are collected in the
    /// result; the keys are only swapped when every message was rewritten.
    /// Running it again with the same passwords resumes an incomplete change.
    pub fn change_password<F>(
        &self,
        old: Password,
        new: Password,
        mut on_progress: F,
    ) -> Result<PasswordChangeResult>
    where
        F: FnMut(Progress),
    {
        let _busy = BusyGuard::acquire(&self.pass_busy, CoreError::PasswordChangeInProgress)?;
        let account_id = self.session.account_id().ok_or(CoreError::NoKeyMaterial)?;

        let current = self
            .store
            .load_verifier(&account_id, VerifierSlot::Current)?
            .ok_or_else(|| CoreError::CorruptVerifier("no current verifier".into()))?;
        let old_key = current
            .unlock(&old, &account_id)?
            .ok_or(CoreError::InvalidCredentialsForReencryption)?;
        drop(old);

        let new_key = match self.load_pending(&account_id)? {
            Some(pending) => {
                let key = pending
                    .unlock(&new, &account_id)?
                    .ok_or(CoreError::PendingChangeMismatch)?;
                info!(
                    account_id = %account_id,
                    version = key.version(),
                    "resuming interrupted password change"
                );
                key
            }
            None => {
                let version = current
                    .version()
                    .max(self.store.max_key_version(&account_id)?)
                    + 1;
                let (verifier, key) = KeyVerifier::create(&new, &account_id, version, self.kdf)?;
                self.store
                    .store_verifier(&account_id, VerifierSlot::Pending, &verifier)?;
                info!(
                    account_id = %account_id,
                    from = current.version(),
                    to = version,
                    "password change started"
                );
                key
            }
        };
        drop(new);

        let cancel = self.begin_pass();
        let result = self.rotate_all(&account_id, old_key, new_key, &cancel, &mut on_progress);
        self.end_pass();
        result
    }

    fn rotate_all(
        &self,
        account_id: &str,
        old_key: SessionKeyMaterial,
        new_key: SessionKeyMaterial,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(Progress),
    ) -> Result<PasswordChangeResult> {
        let source = Some(old_key.version());
        let target = new_key.version();

        let pass = {
            let mut rotate = |message: &StoredMessage| -> Result<(u32, CypherText)> {
                let body = rotate_message(&old_key, &new_key, account_id, &message.body)?;
                Ok((target, body))
            };
            reencrypt_messages(&*self.store, account_id, source, cancel, on_progress, &mut rotate)
        };
        let mut report = match pass {
            Ok(report) if report.success => report,
            other => {
                // both versions now exist on disk and must stay readable
                self.keep_both_keys(account_id, old_key, new_key);
                if let Err(err) = self.refresh_state(account_id) {
                    warn!(account_id, error = %err, "could not refresh encryption state");
                }
                if let Ok(report) = &other {
                    warn!(
                        account_id,
                        rewritten = report.messages_re_encrypted,
                        failed = report.failures.len(),
                        cancelled = report.cancelled,
                        "password change incomplete, old key stays active"
                    );
                }
                return other;
            }
        };

        if !self.session.swap_active(account_id, new_key) {
            warn!(account_id, "session ended before the new key was installed");
            report.cancelled = true;
            report.success = false;
            return Ok(report);
        }

        // Posts are sealed under the new key from here on, so the sweep below
        // sees every message the main pass could have missed.
        let sweep = {
            let session = &self.session;
            let mut sweep_rotate = |message: &StoredMessage| -> Result<(u32, CypherText)> {
                session.with_active_key(|account, active| {
                    if active.version() != target {
                        return Err(CoreError::NoKeyMaterial);
                    }
                    Ok((target, rotate_message(&old_key, active, account, &message.body)?))
                })
            };
            let base = report.total;
            let mut offset = |p: Progress| {
                on_progress(Progress {
                    current: base + p.current,
                    total: base + p.total,
                })
            };
            reencrypt_messages(
                &*self.store,
                account_id,
                source,
                cancel,
                &mut offset,
                &mut sweep_rotate,
            )
        };
        let sweep_err = match sweep {
            Ok(sweep) => {
                report.absorb(sweep);
                None
            }
            Err(err) => {
                report.success = false;
                Some(err)
            }
        };

        if report.success {
            self.store.promote_pending_verifier(account_id)?;
            self.session.drop_retained(account_id);
            info!(
                account_id,
                version = target,
                rewritten = report.messages_re_encrypted,
                "password change completed"
            );
        } else {
            // pending stays unpromoted, so the old key must be the active one again
            self.session.swap_active(account_id, old_key);
            warn!(
                account_id,
                failed = report.failures.len(),
                cancelled = report.cancelled,
                "password change incomplete in final sweep, old key stays active"
            );
        }
        self.refresh_state(account_id)?;
        match sweep_err {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Keep whichever of the two keys is not active next to the active one
    fn keep_both_keys(
        &self,
        account_id: &str,
        old_key: SessionKeyMaterial,
        new_key: SessionKeyMaterial,
    ) {
        if self.session.active_version() == Some(new_key.version()) {
            self.session.retain(account_id, old_key);
        } else {
            self.session.retain(account_id, new_key);
        }
    }

    // ── legacy migration ──────────────────────────────────────────────────

    /// Seal every legacy plaintext message of the signed-in account under the
    /// active key.
    pub fn migrate_legacy<F>(&self, mut on_progress: F) -> Result<ReencryptionReport>
    where
        F: FnMut(Progress),
    {
        let _busy = BusyGuard::acquire(&self.pass_busy, CoreError::PasswordChangeInProgress)?;
        let account_id = self.session.account_id().ok_or(CoreError::NoKeyMaterial)?;
        info!(account_id = %account_id, "legacy migration started");

        let session = &self.session;
        let mut seal = |message: &StoredMessage| -> Result<(u32, CypherText)> {
            session.with_active_key(|account, key| {
                if account != message.account_id {
                    return Err(CoreError::NoKeyMaterial);
                }
                Ok((key.version(), upgrade_from_legacy(key, account, &message.body)?))
            })
        };

        let cancel = self.begin_pass();
        let pass = reencrypt_messages(
            &*self.store,
            &account_id,
            None,
            &cancel,
            &mut on_progress,
            &mut seal,
        );
        self.end_pass();

        let report = pass?;
        if report.success {
            self.refresh_state(&account_id)?;
        }
        info!(
            account_id = %account_id,
            migrated = report.messages_re_encrypted,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "legacy migration finished"
        );
        Ok(report)
    }

    // ── sign-out, cancellation, erasure ───────────────────────────────────

    /// Discard all key material and stop any running pass. Idempotent.
    pub fn sign_out(&self) {
        self.cancel_in_flight();
        if self.session.is_active() {
            info!("signing out, dropping key material");
        }
        self.session.clear();
    }

    /// Ask the running re-encryption pass to stop after its current message
    pub fn cancel_in_flight(&self) {
        if let Some(token) = self.in_flight().as_ref() {
            token.cancel();
        }
    }

    /// Delete every message and verifier of the signed-in account, then sign out.
    pub fn erase_account(&self) -> Result<usize> {
        let _busy = BusyGuard::acquire(&self.pass_busy, CoreError::PasswordChangeInProgress)?;
        let account_id = self.session.account_id().ok_or(CoreError::NoKeyMaterial)?;
        let deleted = self.store.delete_account(&account_id)?;
        info!(account_id = %account_id, deleted, "account data erased");
        self.sign_out();
        Ok(deleted)
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<CancelToken>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_pass(&self) -> CancelToken {
        let token = CancelToken::new();
        *self.in_flight() = Some(token.clone());
        token
    }

    fn end_pass(&self) {
        self.in_flight().take();
    }
}

impl<S: MessageStore + 'static> EncryptionManager<S> {
    /// Run [`change_password`](Self::change_password) on a background thread
    pub fn spawn_password_change<F>(
        self: &Arc<Self>,
        old: Password,
        new: Password,
        on_progress: F,
    ) -> JoinHandle<Result<PasswordChangeResult>>
    where
        F: FnMut(Progress) + Send + 'static,
    {
        let manager = Arc::clone(self);
        std::thread::spawn(move || manager.change_password(old, new, on_progress))
    }
}

fn derivation_failed(account_id: &str, err: CoreError) -> Result<SignInOutcome> {
    match err {
        CoreError::KeyDerivationFailure(reason) => {
            warn!(account_id, %reason, "key derivation failed, no keys installed");
            Ok(SignInOutcome {
                account_id: account_id.to_owned(),
                state: EncryptionState::InitializationRequired(InitReason::DerivationFailed),
            })
        }
        other => Err(other),
    }
}
