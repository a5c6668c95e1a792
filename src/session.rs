// src/session.rs
//! In-memory key session
//!
//! A [`KeySession`] is the one place key material lives after sign-in. It is
//! an explicit context object: the manager installs keys into it, the
//! messaging layer borrows keys from it, and sign-out (or idle expiry) clears
//! it. Clones share the same session.
//!
//! The session holds an *active* key, used for every new message, and at most
//! one *retained* key, which is only used to open messages still sealed under
//! it while a password change is incomplete.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::core::kdf::SessionKeyMaterial;
use crate::core::Result;
use crate::enums::EncryptionState;
use crate::error::CoreError;

struct SessionInner {
    account_id: String,
    active: SessionKeyMaterial,
    retained: Option<SessionKeyMaterial>,
    state: EncryptionState,
    last_activity: Instant,
    idle_timeout: Option<Duration>,
}

impl SessionInner {
    fn expired(&self) -> bool {
        self.idle_timeout
            .is_some_and(|timeout| self.last_activity.elapsed() > timeout)
    }
}

#[derive(Clone, Default)]
pub struct KeySession {
    inner: Arc<Mutex<Option<SessionInner>>>,
}

impl KeySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<SessionInner>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops expired key material, then returns what is left
    fn live(slot: &mut Option<SessionInner>) -> Option<&mut SessionInner> {
        if slot.as_ref().is_some_and(SessionInner::expired) {
            tracing::info!("session idle timeout reached, dropping key material");
            *slot = None;
        }
        slot.as_mut()
    }

    pub(crate) fn install(
        &self,
        account_id: &str,
        active: SessionKeyMaterial,
        state: EncryptionState,
        idle_timeout: Option<Duration>,
    ) {
        *self.lock() = Some(SessionInner {
            account_id: account_id.to_owned(),
            active,
            retained: None,
            state,
            last_activity: Instant::now(),
            idle_timeout,
        });
    }

    /// Discard all key material. Safe to call when nothing is held.
    pub fn clear(&self) {
        self.lock().take();
    }

    pub fn is_active(&self) -> bool {
        Self::live(&mut self.lock()).is_some()
    }

    pub fn account_id(&self) -> Option<String> {
        Self::live(&mut self.lock()).map(|s| s.account_id.clone())
    }

    pub fn state(&self) -> Option<EncryptionState> {
        Self::live(&mut self.lock()).map(|s| s.state)
    }

    pub fn active_version(&self) -> Option<u32> {
        Self::live(&mut self.lock()).map(|s| s.active.version())
    }

    pub fn retained_version(&self) -> Option<u32> {
        Self::live(&mut self.lock()).and_then(|s| s.retained.as_ref().map(|k| k.version()))
    }

    /// Time left before idle expiry; `None` when signed out or expiry is disabled
    pub fn time_until_expiry(&self) -> Option<Duration> {
        let mut guard = self.lock();
        let inner = Self::live(&mut guard)?;
        let timeout = inner.idle_timeout?;
        Some(timeout.saturating_sub(inner.last_activity.elapsed()))
    }

    pub(crate) fn set_state(&self, account_id: &str, state: EncryptionState) {
        if let Some(inner) = Self::live(&mut self.lock()) {
            if inner.account_id == account_id {
                inner.state = state;
            }
        }
    }

    /// Run `f` with the active key. Touches the idle timer.
    pub fn with_active_key<R>(
        &self,
        f: impl FnOnce(&str, &SessionKeyMaterial) -> Result<R>,
    ) -> Result<R> {
        let mut guard = self.lock();
        let inner = Self::live(&mut guard).ok_or(CoreError::NoKeyMaterial)?;
        inner.last_activity = Instant::now();
        f(&inner.account_id, &inner.active)
    }

    /// Run `f` with whichever held key has `version`. Touches the idle timer.
    ///
    /// A version no held key matches is a [`CoreError::Decrypt`]: the session is
    /// fine, that one message just cannot be opened with it.
    pub fn with_key_for_version<R>(
        &self,
        version: u32,
        f: impl FnOnce(&str, &SessionKeyMaterial) -> Result<R>,
    ) -> Result<R> {
        let mut guard = self.lock();
        let inner = Self::live(&mut guard).ok_or(CoreError::NoKeyMaterial)?;
        inner.last_activity = Instant::now();
        let key = if inner.active.version() == version {
            &inner.active
        } else {
            match inner.retained.as_ref() {
                Some(retained) if retained.version() == version => retained,
                _ => return Err(CoreError::Decrypt),
            }
        };
        f(&inner.account_id, key)
    }

    /// Keep `key` readable next to the active key. Returns false (and drops
    /// `key`) if the session no longer belongs to `account_id`.
    pub(crate) fn retain(&self, account_id: &str, key: SessionKeyMaterial) -> bool {
        match Self::live(&mut self.lock()) {
            Some(inner) if inner.account_id == account_id => {
                if inner.active.version() != key.version() {
                    inner.retained = Some(key);
                }
                true
            }
            _ => false,
        }
    }

    /// Make `key` active; the previous active key becomes the retained one.
    /// Returns false (and drops `key`) if the session no longer belongs to `account_id`.
    pub(crate) fn swap_active(&self, account_id: &str, key: SessionKeyMaterial) -> bool {
        match Self::live(&mut self.lock()) {
            Some(inner) if inner.account_id == account_id => {
                if inner.active.version() != key.version() {
                    let previous = std::mem::replace(&mut inner.active, key);
                    inner.retained = Some(previous);
                }
                true
            }
            _ => false,
        }
    }

    /// Forget the retained key, if any
    pub(crate) fn drop_retained(&self, account_id: &str) {
        if let Some(inner) = Self::live(&mut self.lock()) {
            if inner.account_id == account_id {
                inner.retained = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::Password;
    use crate::core::kdf::{derive_key_material, KdfParams};

    fn key(version: u32) -> SessionKeyMaterial {
        derive_key_material(
            &Password::new("pw".to_owned()),
            "alice",
            version,
            &[version as u8; 16],
            &KdfParams::fast(),
        )
        .unwrap()
    }

    #[test]
    fn empty_session_has_no_key_material() {
        let session = KeySession::new();
        let err = session.with_active_key(|_, _| Ok(())).unwrap_err();
        assert!(matches!(err, CoreError::NoKeyMaterial));
    }

    #[test]
    fn clear_is_idempotent() {
        let session = KeySession::new();
        session.install("alice", key(1), EncryptionState::Ready, None);
        session.clear();
        session.clear();
        assert!(!session.is_active());
    }

    #[test]
    fn idle_timeout_expires_keys() {
        let session = KeySession::new();
        session.install(
            "alice",
            key(1),
            EncryptionState::Ready,
            Some(Duration::from_millis(10)),
        );
        std::thread::sleep(Duration::from_millis(30));
        assert!(matches!(
            session.with_active_key(|_, _| Ok(())),
            Err(CoreError::NoKeyMaterial)
        ));
        assert!(session.account_id().is_none());
    }

    #[test]
    fn swap_keeps_previous_key_for_reading() {
        let session = KeySession::new();
        session.install("alice", key(1), EncryptionState::Ready, None);
        assert!(session.swap_active("alice", key(2)));

        assert_eq!(session.active_version(), Some(2));
        assert_eq!(session.retained_version(), Some(1));
        assert!(session.with_key_for_version(1, |_, k| Ok(k.version())).is_ok());
        assert!(matches!(
            session.with_key_for_version(3, |_, _| Ok(())),
            Err(CoreError::Decrypt)
        ));

        session.drop_retained("alice");
        assert_eq!(session.retained_version(), None);
    }

    #[test]
    fn swap_for_other_account_is_refused() {
        let session = KeySession::new();
        session.install("alice", key(1), EncryptionState::Ready, None);
        assert!(!session.swap_active("bob", key(2)));
        assert_eq!(session.active_version(), Some(1));
    }
}
