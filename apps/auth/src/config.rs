use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider_url: String,
    pub provider_api_key: String,
    pub credential_cache_path: PathBuf,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            provider_url: require_env("AUTH_PROVIDER_URL")?,
            provider_api_key: require_env("AUTH_PROVIDER_API_KEY")?,
            credential_cache_path: std::env::var("AUTH_CACHE_PATH")
                .unwrap_or_else(|_| ".auth-session.json".to_string())
                .into(),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
