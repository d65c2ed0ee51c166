//! Error Classifier — pure, deterministic mapping from provider failure
//! shapes (status codes, error code strings, message substrings) to a
//! failure class the strategy table can act on.

use tracing::Level;

use crate::errors::AuthError;
use crate::models::conflict::ConflictCategory;

/// What kind of failure a provider error represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network/timeout trouble; the provider never answered.
    Transport,
    /// The account already holds an active session elsewhere.
    ExistingSession,
    /// The provider refused to clear every session for the account.
    AllSessionsClearFailed,
    /// Credentials rejected, or no session to work with. Terminal.
    Unauthorized,
    /// Nothing we recognize. Surfaced verbatim, never auto-handled.
    Unknown,
}

impl From<FailureClass> for ConflictCategory {
    fn from(class: FailureClass) -> Self {
        match class {
            FailureClass::ExistingSession => ConflictCategory::ExistingSession,
            FailureClass::AllSessionsClearFailed => ConflictCategory::AllSessionsClearFailed,
            _ => ConflictCategory::Unknown,
        }
    }
}

/// Classifies a provider failure. Total: every error maps to exactly one
/// class, and the same error shape always maps to the same class.
pub fn classify(error: &AuthError) -> FailureClass {
    match error {
        AuthError::Transport(_) => FailureClass::Transport,
        AuthError::Unauthorized | AuthError::SessionMissing => FailureClass::Unauthorized,
        AuthError::Provider {
            status,
            code,
            message,
        } => classify_provider(*status, code, message),
        AuthError::ResolutionInProgress
        | AuthError::Storage(_)
        | AuthError::Encoding(_)
        | AuthError::Unknown(_) => FailureClass::Unknown,
    }
}

fn classify_provider(status: u16, code: &str, message: &str) -> FailureClass {
    if status == 401 || code == "unauthorized" {
        return FailureClass::Unauthorized;
    }
    if code == "session_clear_failed" {
        return FailureClass::AllSessionsClearFailed;
    }
    if status == 409 || code == "session_already_active" {
        return FailureClass::ExistingSession;
    }
    // Some provider deployments only say it in prose.
    let message = message.to_lowercase();
    if message.contains("session already active") || message.contains("already signed in") {
        return FailureClass::ExistingSession;
    }
    if message.contains("could not clear all sessions") {
        return FailureClass::AllSessionsClearFailed;
    }
    FailureClass::Unknown
}

/// Logging severity for a failure class. `AllSessionsClearFailed` and
/// `Unknown` should be captured for diagnostics; a duplicate-session
/// conflict mid-resolution is routine.
pub fn severity(class: FailureClass) -> Level {
    match class {
        FailureClass::AllSessionsClearFailed | FailureClass::Unknown => Level::ERROR,
        FailureClass::Unauthorized | FailureClass::Transport => Level::WARN,
        FailureClass::ExistingSession => Level::INFO,
    }
}
