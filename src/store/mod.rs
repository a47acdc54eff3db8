//! Backend storage abstractions.
//!
//! The rest of the crate talks to the outside world through four narrow
//! traits: [`ResourceStore`] for resource collections, [`IdentityProvider`]
//! for credential verification, [`ProfileStore`] for role/department
//! profiles, and [`FileStore`] for archival uploads. [`SessionStore`] is the
//! local persistence seam for the signed-in principal.
//!
//! Two backends implement them: [`RestBackend`] against a PostgREST-style
//! HTTP API (the system of record in deployments) and [`MemoryBackend`], an
//! in-process fixture for tests and demos.

pub mod memory;
pub mod rest;
pub mod session;

pub use memory::MemoryBackend;
pub use rest::RestBackend;
pub use session::{FileSessionStore, MemorySessionStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gateway::{QueryOptions, Record};
use crate::rbac::Principal;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque identifier the identity provider assigns to an authenticated
/// subject. Joins the identity record to its profile row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A subject's profile row: the directory entry that carries role and
/// department. Identity (who you are) and profile (what you may do) are
/// separate records joined by the subject id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// CRUD over named resource collections.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// List records matching the options. Filters are conjunctive equality.
    async fn list(&self, resource: &str, options: &QueryOptions) -> Result<Vec<Record>>;

    /// Insert a record and return it as stored (id and timestamps filled in).
    async fn insert(&self, resource: &str, fields: Record) -> Result<Record>;

    /// Merge fields into the record with the given id and return the result.
    async fn update(&self, resource: &str, id: &str, fields: Record) -> Result<Record>;

    /// Delete the record with the given id.
    async fn delete(&self, resource: &str, id: &str) -> Result<()>;
}

/// Credential verification and session teardown at the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify credentials and return the subject id on success.
    async fn sign_in(&self, email: &str, password: &str) -> Result<SubjectId>;

    /// Invalidate the provider-side session, if any.
    async fn sign_out(&self) -> Result<()>;
}

/// Lookup of profile rows by subject id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_by_id(&self, subject_id: &str) -> Result<Option<Profile>>;
}

/// Blob uploads for import archival. Returns the stored object's URL.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn upload(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<String>;
}

/// Local persistence of the signed-in principal across restarts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, principal: &Principal) -> Result<()>;
    async fn load(&self) -> Result<Option<Principal>>;
    async fn clear(&self) -> Result<()>;
}
