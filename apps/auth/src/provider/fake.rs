//! In-memory provider with scripted outcomes, for exercising the recovery
//! engine without a network. Call counters are atomics so tests can assert
//! exactly which provider calls a code path made.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::errors::AuthError;
use crate::models::session::{Identity, Session};
use crate::provider::{IdentityProvider, SessionGrant};

type Scripted<T> = Mutex<VecDeque<Result<T, AuthError>>>;

#[derive(Default)]
pub struct FakeProvider {
    sign_in_script: Scripted<SessionGrant>,
    session_script: Scripted<SessionGrant>,
    refresh_script: Scripted<SessionGrant>,
    clear_current_script: Scripted<()>,
    clear_all_script: Scripted<()>,

    pub sign_in_calls: AtomicU32,
    pub session_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub clear_current_calls: AtomicU32,
    pub clear_all_calls: AtomicU32,
}

/// A grant for a made-up user with an hour of validity.
pub fn make_grant(email: &str) -> SessionGrant {
    SessionGrant {
        session: Session {
            access_token: format!("tok-{}", Uuid::new_v4()),
            expires_at: Utc::now() + Duration::hours(1),
        },
        identity: Identity {
            id: Uuid::new_v4(),
            name: "Test User".to_string(),
            email: email.to_string(),
            is_admin: false,
        },
    }
}

/// The provider's duplicate-session rejection.
pub fn existing_session_error() -> AuthError {
    AuthError::Provider {
        status: 409,
        code: "session_already_active".to_string(),
        message: "account already has an active session".to_string(),
    }
}

/// The provider's 401.
pub fn unauthorized_error() -> AuthError {
    AuthError::Provider {
        status: 401,
        code: "unauthorized".to_string(),
        message: "invalid credentials".to_string(),
    }
}

/// A transport-level failure, built without touching the network: an
/// unbuildable request yields a real `reqwest::Error`.
pub fn transport_error() -> AuthError {
    let err = reqwest::Client::new()
        .get("http://")
        .build()
        .expect_err("empty-host URL must not build");
    AuthError::Transport(err)
}

/// The provider's "could not clear all sessions" rejection.
pub fn clear_failed_error() -> AuthError {
    AuthError::Provider {
        status: 500,
        code: "session_clear_failed".to_string(),
        message: "could not clear all sessions".to_string(),
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_sign_in(&self, result: Result<SessionGrant, AuthError>) {
        self.sign_in_script.lock().unwrap().push_back(result);
    }

    pub fn push_session(&self, result: Result<SessionGrant, AuthError>) {
        self.session_script.lock().unwrap().push_back(result);
    }

    pub fn push_refresh(&self, result: Result<SessionGrant, AuthError>) {
        self.refresh_script.lock().unwrap().push_back(result);
    }

    pub fn push_clear_current(&self, result: Result<(), AuthError>) {
        self.clear_current_script.lock().unwrap().push_back(result);
    }

    pub fn push_clear_all(&self, result: Result<(), AuthError>) {
        self.clear_all_script.lock().unwrap().push_back(result);
    }

    fn next<T>(script: &Scripted<T>, exhausted: impl FnOnce() -> Result<T, AuthError>) -> Result<T, AuthError> {
        match script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => exhausted(),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn sign_in(&self, email: &str, _password: &str) -> Result<SessionGrant, AuthError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let email = email.to_string();
        Self::next(&self.sign_in_script, move || Ok(make_grant(&email)))
    }

    async fn current_session(&self) -> Result<SessionGrant, AuthError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.session_script, || Err(AuthError::SessionMissing))
    }

    async fn refresh_session(&self) -> Result<SessionGrant, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.refresh_script, || Err(AuthError::SessionMissing))
    }

    async fn clear_current_session(&self) -> Result<(), AuthError> {
        self.clear_current_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.clear_current_script, || Ok(()))
    }

    async fn clear_all_sessions(&self) -> Result<(), AuthError> {
        self.clear_all_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.clear_all_script, || Ok(()))
    }
}
