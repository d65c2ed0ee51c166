//! Conflict bookkeeping — the record a login-collision resolution leaves
//! behind for the UI to render (progress, countdown text, last error).

use serde::{Deserialize, Serialize};

/// Lifecycle category of a conflict record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictCategory {
    /// The provider reported the account as already signed in elsewhere.
    ExistingSession,
    /// A "clear every session" call was rejected by the provider.
    AllSessionsClearFailed,
    /// An automatic recovery cycle is currently running.
    ResolutionInProgress,
    /// Recovery finished with a usable session.
    ResolutionSuccess,
    /// Anything the classifier did not recognize.
    Unknown,
}

/// How a recovery clears server-side state: only the colliding session, or
/// every session the account holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionMethod {
    Current,
    All,
}

/// The classified shape of the last provider failure, preserved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// Bookkeeping for one login-collision resolution sequence.
///
/// Created when a login attempt first reports a conflict; mutated only by the
/// resolution machine; cleared when resolution succeeds, is abandoned, or a
/// new login attempt begins. `attempts` never exceeds the configured maximum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub category: ConflictCategory,
    pub attempts: u32,
    pub method: Option<ResolutionMethod>,
    pub resolved: bool,
    pub last_error: Option<ErrorInfo>,
}

impl ConflictRecord {
    /// A fresh record for a newly detected collision. No attempt has run yet.
    pub fn new() -> Self {
        Self {
            category: ConflictCategory::ExistingSession,
            attempts: 0,
            method: None,
            resolved: false,
            last_error: None,
        }
    }
}

impl Default for ConflictRecord {
    fn default() -> Self {
        Self::new()
    }
}
