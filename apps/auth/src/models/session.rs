use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An identity-provider session: opaque access token plus an expiry hint.
///
/// Owned exclusively by the `AuthStore`. Created on successful login or
/// successful recovery; destroyed on explicit logout or recovery exhaustion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// True if the expiry hint is still in the future.
    pub fn is_fresh(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// The authenticated user's profile.
///
/// Always derived from, and lifetime-bound to, a valid `Session` — never
/// stored independently. Clearing the session clears the identity with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}
