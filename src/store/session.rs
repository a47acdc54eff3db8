//! Durable client-side session storage.
//!
//! The Principal is persisted at login so a reload restores the session
//! without re-prompting for credentials. [`FileSessionStore`] writes a JSON
//! file; [`MemorySessionStore`] is the in-process variant for tests.

use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::rbac::Principal;

use super::SessionStore;

/// Session persisted as a JSON file.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, principal: &Principal) -> Result<()> {
        let json = serde_json::to_vec_pretty(principal)?;
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), "Session persisted");
        Ok(())
    }

    async fn load(&self) -> Result<Option<Principal>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process session slot.
#[derive(Default)]
pub struct MemorySessionStore {
    slot: RwLock<Option<Principal>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, principal: &Principal) -> Result<()> {
        *self.slot.write() = Some(principal.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Principal>> {
        Ok(self.slot.read().clone())
    }

    async fn clear(&self) -> Result<()> {
        self.slot.write().take();
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
