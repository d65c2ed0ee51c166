//! Session Validity Oracle — answers "is the stored session usable?"
//! without forcing a new login.
//!
//! `check_validity` is strictly read-only and never treats "not logged in"
//! as an error. Transport trouble gets a single retry at this layer; the
//! conflict machine above never retries transport failures itself.

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::AuthError;
use crate::models::session::{Identity, Session};
use crate::provider::IdentityProvider;
use crate::recovery::classify::{classify, FailureClass};

/// Outcome of a validity probe.
#[derive(Debug, Clone)]
pub struct Validity {
    pub valid: bool,
    pub session: Option<Session>,
    pub identity: Option<Identity>,
    pub reason: Option<String>,
}

impl Validity {
    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            session: None,
            identity: None,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Clone)]
pub struct SessionOracle {
    provider: Arc<dyn IdentityProvider>,
}

impl SessionOracle {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Single read-only probe against the provider using stored credentials.
    /// Returns `Err` only for transport failure (after one retry); callers
    /// treat that as invalid with the error preserved for classification.
    pub async fn check_validity(&self) -> Result<Validity, AuthError> {
        let mut last_transport: Option<AuthError> = None;

        for attempt in 0..2 {
            match self.provider.current_session().await {
                Ok(grant) => {
                    if !grant.session.is_fresh() {
                        return Ok(Validity::invalid("stored session is expired"));
                    }
                    debug!("Stored session is valid for {}", grant.identity.email);
                    return Ok(Validity {
                        valid: true,
                        session: Some(grant.session),
                        identity: Some(grant.identity),
                        reason: None,
                    });
                }
                Err(err) if classify(&err) == FailureClass::Transport => {
                    if attempt == 0 {
                        debug!("Validity probe hit transport trouble, retrying once");
                    }
                    last_transport = Some(err);
                }
                // Not signed in, rejected token, or anything else the
                // provider said out loud: a normal "not valid" answer.
                Err(err) => return Ok(Validity::invalid(err.to_string())),
            }
        }

        Err(last_transport.expect("loop exits early unless transport failed"))
    }

    /// Asks the provider to mint a fresh session from its refresh
    /// mechanism, then validates the result. Used only after stale local
    /// state has been cleared. Propagates a provider rejection loudly —
    /// that means "no valid session found" and ends the current attempt.
    pub async fn refresh_and_validate(&self) -> Result<Validity, AuthError> {
        let grant = self.provider.refresh_session().await?;
        if !grant.session.is_fresh() {
            // A refresh that hands back an already-expired session is as
            // good as no session at all.
            return Err(AuthError::SessionMissing);
        }
        info!("Provider minted a fresh session for {}", grant.identity.email);
        Ok(Validity {
            valid: true,
            session: Some(grant.session),
            identity: Some(grant.identity),
            reason: None,
        })
    }
}
