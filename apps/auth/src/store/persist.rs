use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::session::{Identity, Session};

/// The persisted client-side auth blob: one JSON document on disk.
///
/// Written whole on login/recovery success, deleted whole during the
/// recovery clear step and on logout. Never partially mutated.
#[derive(Debug, Clone)]
pub struct CredentialCache {
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedCredentials {
    pub session: Session,
    pub identity: Identity,
    pub saved_at: DateTime<Utc>,
}

impl CredentialCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn save(&self, session: &Session, identity: &Identity) -> Result<()> {
        let blob = CachedCredentials {
            session: session.clone(),
            identity: identity.clone(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&blob)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))?;
        debug!("Persisted credentials to {}", self.path.display());
        Ok(())
    }

    /// Loads the blob if present. A missing file is `None`; a corrupted blob
    /// is logged and treated as absent rather than wedging startup.
    pub fn load(&self) -> Result<Option<CachedCredentials>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        match serde_json::from_str(&raw) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) => {
                warn!("Discarding unreadable credential blob: {e}");
                Ok(None)
            }
        }
    }

    /// Whole-file delete. Idempotent: clearing an absent blob is fine.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Cleared persisted credentials at {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
