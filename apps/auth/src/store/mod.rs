//! Auth Session Store — the sole place the rest of the client reads
//! "am I logged in, and is there a conflict being resolved."
//!
//! All state lives behind one mutex so `logout` can clear identity, session,
//! and conflict record in a single step — partial clears are never
//! observable. The persisted blob is owned here too: the resolver's clear
//! step and `logout` are the only writers, per the shared-resource rule.

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::models::conflict::{ConflictCategory, ConflictRecord, ErrorInfo, ResolutionMethod};
use crate::models::session::{Identity, Session};
use crate::store::persist::CredentialCache;

pub mod persist;

#[derive(Debug, Default)]
struct AuthState {
    identity: Option<Identity>,
    session: Option<Session>,
    conflict: Option<ConflictRecord>,
}

/// Process-wide authentication state. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<Mutex<AuthState>>,
    cache: CredentialCache,
}

impl AuthStore {
    pub fn new(cache: CredentialCache) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AuthState::default())),
            cache,
        }
    }

    /// Restores identity and session from the persisted blob, if present.
    pub fn hydrate_from_cache(&self) -> Option<Session> {
        let blob = match self.cache.load() {
            Ok(blob) => blob?,
            Err(e) => {
                warn!("Could not read persisted credentials: {e}");
                return None;
            }
        };
        let mut state = self.lock();
        state.identity = Some(blob.identity);
        state.session = Some(blob.session.clone());
        Some(blob.session)
    }

    // ── Getters ─────────────────────────────────────────────────────────────

    pub fn identity(&self) -> Option<Identity> {
        self.lock().identity.clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    pub fn conflict_record(&self) -> Option<ConflictRecord> {
        self.lock().conflict.clone()
    }

    // ── Credential mutators ─────────────────────────────────────────────────

    pub fn set_identity(&self, identity: Identity) {
        self.lock().identity = Some(identity);
    }

    pub fn set_session(&self, session: Session) {
        self.lock().session = Some(session);
    }

    /// Writes the current in-memory credentials to the persisted blob.
    pub fn persist_credentials(&self) {
        let (session, identity) = {
            let state = self.lock();
            (state.session.clone(), state.identity.clone())
        };
        match (session, identity) {
            (Some(session), Some(identity)) => {
                if let Err(e) = self.cache.save(&session, &identity) {
                    warn!("Could not persist credentials: {e}");
                }
            }
            _ => warn!("Skipping credential persist: no complete session in memory"),
        }
    }

    /// The recovery clear step: drops in-memory identity and session and
    /// deletes the persisted blob, leaving the conflict record in place.
    pub fn clear_credentials(&self) {
        {
            let mut state = self.lock();
            state.identity = None;
            state.session = None;
        }
        if let Err(e) = self.cache.clear() {
            warn!("Could not clear persisted credentials: {e}");
        }
    }

    // ── Conflict record mutators ────────────────────────────────────────────

    /// Marks the start of an attempt. Creates the record on first call,
    /// increments `attempts` on every call.
    pub fn record_conflict_start(&self) {
        let mut state = self.lock();
        let record = state.conflict.get_or_insert_with(ConflictRecord::new);
        record.attempts += 1;
        record.category = ConflictCategory::ResolutionInProgress;
    }

    pub fn record_conflict_resolved(&self) {
        let mut state = self.lock();
        if let Some(record) = state.conflict.as_mut() {
            record.resolved = true;
            record.category = ConflictCategory::ResolutionSuccess;
        }
    }

    pub fn record_conflict_failed(&self, category: ConflictCategory, info: ErrorInfo) {
        let mut state = self.lock();
        if let Some(record) = state.conflict.as_mut() {
            record.resolved = false;
            record.category = category;
            record.last_error = Some(info);
        }
    }

    pub fn set_conflict_method(&self, method: ResolutionMethod) {
        let mut state = self.lock();
        if let Some(record) = state.conflict.as_mut() {
            record.method = Some(method);
        }
    }

    pub fn clear_conflict_record(&self) {
        self.lock().conflict = None;
    }

    // ── Logout ──────────────────────────────────────────────────────────────

    /// Clears identity, session, and conflict record atomically, then drops
    /// the persisted blob. Never fails; storage trouble is logged.
    pub fn logout(&self) {
        {
            let mut state = self.lock();
            state.identity = None;
            state.session = None;
            state.conflict = None;
        }
        if let Err(e) = self.cache.clear() {
            warn!("Could not clear persisted credentials on logout: {e}");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AuthState> {
        self.inner.lock().expect("auth state lock poisoned")
    }
}
