//! Role-Based Access Control: the Role Registry and the Access Control Engine.
//!
//! This module provides:
//! - **Models**: Principal, RoleDefinition, Department data structures
//! - **Role Registry**: the static, per-deployment table mapping each role to
//!   its permission set and accessible departments
//! - **Access Control Engine**: authentication against the identity provider,
//!   permission and department predicates, session lifecycle
//!
//! # Usage
//!
//! ```rust,ignore
//! use fieldgate_core::rbac::{AccessControl, Credentials, Department, RoleRegistry};
//!
//! let access = AccessControl::new(identity, profiles, sessions, RoleRegistry::builtin());
//!
//! let session = access
//!     .authenticate(&Credentials::new("officer@example.com", "secret"))
//!     .await?;
//!
//! if access.has_permission(session.principal(), "sales_create") {
//!     // offer the import action
//! }
//! ```

pub mod engine;
pub mod models;
pub mod registry;

pub use engine::{AccessControl, Session};
pub use models::{Credentials, Department, Principal, RoleDefinition, RoleId};
pub use registry::RoleRegistry;
