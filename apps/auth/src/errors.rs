use thiserror::Error;

use crate::models::conflict::ErrorInfo;

/// Engine-level error type.
/// Everything the identity provider or local storage can throw at us funnels
/// through this enum so the classifier stays a single total match.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Provider error (status {status}, code {code}): {message}")]
    Provider {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("No valid session found")]
    SessionMissing,

    #[error("A conflict resolution is already in flight")]
    ResolutionInProgress,

    #[error("Credential storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Credential encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl AuthError {
    /// Compact `{code, message}` view of this error, preserved on the
    /// conflict record so the UI can explain what happened.
    pub fn info(&self) -> ErrorInfo {
        let code = match self {
            AuthError::Transport(_) => "transport_error",
            AuthError::Provider { code, .. } => code.as_str(),
            AuthError::Unauthorized => "unauthorized",
            AuthError::SessionMissing => "session_missing",
            AuthError::ResolutionInProgress => "resolution_in_progress",
            AuthError::Storage(_) => "storage_error",
            AuthError::Encoding(_) => "encoding_error",
            AuthError::Unknown(_) => "unknown",
        };
        ErrorInfo {
            code: code.to_string(),
            message: self.to_string(),
        }
    }
}
