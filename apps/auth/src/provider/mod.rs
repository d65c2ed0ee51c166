/// Identity Provider Client — the single point of entry for all identity
/// provider calls in the engine.
///
/// ARCHITECTURAL RULE: no other module may touch the provider's HTTP API
/// directly. The recovery engine consumes the `IdentityProvider` trait and
/// never learns about transport details.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::AuthError;
use crate::models::session::{Identity, Session};

#[cfg(test)]
pub mod fake;

const SIGN_IN_PATH: &str = "/auth/v1/token";
const SESSION_PATH: &str = "/auth/v1/session";
const REFRESH_PATH: &str = "/auth/v1/refresh";
const ALL_SESSIONS_PATH: &str = "/auth/v1/sessions";
const MAX_RETRIES: u32 = 3;

/// A session together with the profile it authenticates.
/// The provider returns both in one envelope; the store keeps them apart.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub session: Session,
    pub identity: Identity,
}

/// The provider boundary. All calls are opaque, possibly-failing remote
/// calls; implementations decide the transport.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionGrant, AuthError>;
    async fn current_session(&self) -> Result<SessionGrant, AuthError>;
    async fn refresh_session(&self) -> Result<SessionGrant, AuthError>;
    async fn clear_current_session(&self) -> Result<(), AuthError>;
    async fn clear_all_sessions(&self) -> Result<(), AuthError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    access_token: String,
    expires_at: DateTime<Utc>,
    user: UserEnvelope,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    id: Uuid,
    name: String,
    email: String,
    #[serde(default)]
    is_admin: bool,
}

impl From<SessionEnvelope> for SessionGrant {
    fn from(env: SessionEnvelope) -> Self {
        SessionGrant {
            session: Session {
                access_token: env.access_token,
                expires_at: env.expires_at,
            },
            identity: Identity {
                id: env.user.id,
                name: env.user.name,
                email: env.user.email,
                is_admin: env.user.is_admin,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    code: String,
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ────────────────────────────────────────────────────────────────────────────

/// Concrete provider client speaking the hosted identity service's JSON
/// protocol. Retries on 429 and 5xx with exponential backoff; transport
/// errors are NOT retried here — that single retry belongs to the validity
/// oracle.
pub struct HttpIdentityProvider {
    client: Client,
    base_url: String,
    api_key: String,
    // Bearer token for session-scoped endpoints. Updated on every grant,
    // dropped when the current session is cleared.
    bearer: std::sync::RwLock<Option<String>>,
}

impl HttpIdentityProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            bearer: std::sync::RwLock::new(None),
        }
    }

    /// Seeds the bearer token from a previously persisted session, so a
    /// restarted client can validate without a fresh login.
    pub fn with_cached_token(self, token: Option<String>) -> Self {
        *self.bearer.write().expect("bearer lock poisoned") = token;
        self
    }

    fn set_bearer(&self, token: Option<String>) {
        *self.bearer.write().expect("bearer lock poisoned") = token;
    }

    fn bearer(&self) -> Option<String> {
        self.bearer.read().expect("bearer lock poisoned").clone()
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, AuthError> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Provider call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("apikey", &self.api_key);
            if let Some(token) = self.bearer() {
                request = request.header("authorization", format!("Bearer {token}"));
            }
            if let Some(ref body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let text = response.text().await.unwrap_or_default();
                warn!("Provider returned {}: {}", status, text);
                continue;
            }

            return Ok(response);
        }

        Err(AuthError::Provider {
            status: 503,
            code: "provider_unavailable".to_string(),
            message: format!("provider still failing after {MAX_RETRIES} attempts"),
        })
    }

    /// Turns a non-success response into a typed provider error, parsing the
    /// `{ "error": { "code", "message" } }` body when present.
    async fn into_error(response: reqwest::Response) -> AuthError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let (code, message) = parse_error_body(&body, status);
        AuthError::Provider {
            status: status.as_u16(),
            code,
            message,
        }
    }

    async fn grant_request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<SessionGrant, AuthError> {
        let response = self.send(method, path, body).await?;
        if !response.status().is_success() {
            return Err(Self::into_error(response).await);
        }
        let envelope: SessionEnvelope = response.json().await?;
        debug!(
            expires_at = %envelope.expires_at,
            "Provider issued session for {}", envelope.user.email
        );
        let grant = SessionGrant::from(envelope);
        self.set_bearer(Some(grant.session.access_token.clone()));
        Ok(grant)
    }

    async fn empty_request(&self, method: Method, path: &str) -> Result<(), AuthError> {
        let response = self.send(method, path, None).await?;
        if !response.status().is_success() && response.status() != StatusCode::NO_CONTENT {
            return Err(Self::into_error(response).await);
        }
        Ok(())
    }
}

fn parse_error_body(body: &str, status: StatusCode) -> (String, String) {
    match serde_json::from_str::<ProviderErrorBody>(body) {
        Ok(parsed) => (parsed.error.code, parsed.error.message),
        Err(_) => (
            format!("http_{}", status.as_u16()),
            if body.is_empty() {
                status.to_string()
            } else {
                body.to_string()
            },
        ),
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionGrant, AuthError> {
        self.grant_request(
            Method::POST,
            SIGN_IN_PATH,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    async fn current_session(&self) -> Result<SessionGrant, AuthError> {
        if self.bearer().is_none() {
            // Nothing stored locally; don't bother the network.
            return Err(AuthError::SessionMissing);
        }
        self.grant_request(Method::GET, SESSION_PATH, None).await
    }

    async fn refresh_session(&self) -> Result<SessionGrant, AuthError> {
        self.grant_request(Method::POST, REFRESH_PATH, None).await
    }

    async fn clear_current_session(&self) -> Result<(), AuthError> {
        self.empty_request(Method::DELETE, SESSION_PATH).await?;
        self.set_bearer(None);
        Ok(())
    }

    async fn clear_all_sessions(&self) -> Result<(), AuthError> {
        self.empty_request(Method::DELETE, ALL_SESSIONS_PATH).await?;
        self.set_bearer(None);
        Ok(())
    }
}
