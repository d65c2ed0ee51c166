use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::{
    AuthStore, Config, ConflictResolver, CredentialCache, HttpIdentityProvider, IdentityProvider,
    LoginOutcome, RecoveryPolicy, ResolutionState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting auth client v{}", env!("CARGO_PKG_VERSION"));

    // Initialize credential cache and store
    let cache = CredentialCache::new(config.credential_cache_path.clone());
    let store = AuthStore::new(cache);
    let cached_session = store.hydrate_from_cache();

    // Initialize identity provider client
    let provider = Arc::new(
        HttpIdentityProvider::new(config.provider_url.clone(), config.provider_api_key.clone())
            .with_cached_token(cached_session.map(|s| s.access_token)),
    ) as Arc<dyn IdentityProvider>;
    info!("Identity provider client initialized ({})", config.provider_url);

    // Build the resolver with the production recovery policy
    let resolver = ConflictResolver::new(provider, store, RecoveryPolicy::default());

    let email = require_env("LOGIN_EMAIL")?;
    let password = require_env("LOGIN_PASSWORD")?;

    match resolver.login(&email, &password).await {
        Ok(LoginOutcome::SignedIn) => {
            info!("Signed in; no session conflict");
            return Ok(());
        }
        Ok(LoginOutcome::RecoveryStarted) => {
            info!("Session conflict detected; automatic recovery running");
        }
        Err(err) => {
            warn!("Login failed without a recoverable conflict: {err}");
            anyhow::bail!("login failed: {err}");
        }
    }

    // Follow the resolution until it lands somewhere terminal.
    let mut views = resolver.subscribe();
    loop {
        {
            let view = views.borrow();
            if let Some(secs) = view.countdown() {
                info!("Retrying in {secs}s...");
            }
            match view.state {
                ResolutionState::Success => {
                    info!("Recovery succeeded; session restored");
                    return Ok(());
                }
                ResolutionState::Exhausted => {
                    let detail = view
                        .record
                        .as_ref()
                        .and_then(|r| r.last_error.as_ref())
                        .map(|e| e.message.clone())
                        .unwrap_or_else(|| "no further detail".to_string());
                    anyhow::bail!("automatic recovery exhausted: {detail}");
                }
                _ => {}
            }
        }
        views.changed().await.context("resolver went away")?;
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
