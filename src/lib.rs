//! # Fieldgate Core
//!
//! The cross-cutting core of the Fieldgate business dashboard.
//!
//! ## Architecture
//!
//! - **RBAC**: static role registry plus the access-control engine that owns
//!   authentication and session lifecycle
//! - **Store**: the abstract backend contract (resources, identity, profiles,
//!   files, session persistence) with REST and in-memory implementations
//! - **Gateway**: uniform cached list/create/update/delete over named
//!   resource collections, stale-while-revalidate reads, coarse invalidation
//! - **Import**: the file-to-committed-records pipeline with per-resource
//!   alias tables, typed drafts, and serialized best-effort commit
//! - **Telemetry**: structured logging infrastructure
//! - **Config**: layered configuration from files and environment

pub mod config;
pub mod error;
pub mod gateway;
pub mod import;
pub mod rbac;
pub mod store;
pub mod telemetry;

pub use error::{ErrorCode, ErrorSeverity, FieldgateError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ErrorCode, ErrorSeverity, FieldgateError, Result};
    pub use crate::gateway::{DataGateway, OrderBy, QueryOptions, Record};
    pub use crate::import::{
        AggregateImportResult, ImportFile, ImportPipeline, ImportReport, ImportState,
        ImportTarget, RowOutcome, RowResult,
    };
    pub use crate::rbac::{
        AccessControl, Credentials, Department, Principal, RoleDefinition, RoleId,
        RoleRegistry, Session,
    };
    pub use crate::store::{
        FileStore, IdentityProvider, MemoryBackend, Profile, ResourceStore, RestBackend,
        SessionStore, SubjectId,
    };
}
