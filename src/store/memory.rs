//! In-process backend fixture.
//!
//! Implements every store trait over `DashMap`s so the engine, gateway, and
//! import pipeline can be exercised without a network. Tables can be given
//! unique-column constraints and write-deny policies to reproduce the
//! failures the REST backend surfaces (duplicate keys, row-level policy
//! rejections).
//!
//! The credential table here is a fixture only; deployments authenticate
//! against [`RestBackend`](super::RestBackend).

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{FieldgateError, Result};
use crate::gateway::{QueryOptions, Record};

use super::{FileStore, IdentityProvider, Profile, ProfileStore, ResourceStore, SubjectId};

#[derive(Clone)]
struct Identity {
    password: String,
    subject: SubjectId,
}

/// In-memory implementation of all four backend traits.
#[derive(Default)]
pub struct MemoryBackend {
    tables: DashMap<String, Vec<Record>>,
    unique_columns: DashMap<String, Vec<String>>,
    write_denied: DashSet<String>,
    identities: DashMap<String, Identity>,
    profiles: DashMap<String, Profile>,
    uploads: DashMap<String, Vec<u8>>,
    signed_in: RwLock<Option<SubjectId>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend pre-populated with the demo accounts (password `demo1234`)
    /// and the unique columns the production schema declares.
    pub fn with_demo_seed() -> Self {
        let backend = Self::new();

        for (email, subject, name, role, department) in [
            (
                "admin@demo.test",
                "subject-admin",
                "Demo Admin",
                "super_admin",
                "executive",
            ),
            (
                "sales@demo.test",
                "subject-sales",
                "Demo Sales Officer",
                "sales_officer",
                "sales",
            ),
            (
                "field@demo.test",
                "subject-field",
                "Demo Field Officer",
                "field_officer",
                "fieldops",
            ),
            (
                "hr@demo.test",
                "subject-hr",
                "Demo HR Manager",
                "hr_manager",
                "hr",
            ),
        ] {
            backend.seed_identity(email, "demo1234", subject);
            backend.seed_profile(Profile {
                id: subject.to_string(),
                email: email.to_string(),
                full_name: Some(name.to_string()),
                role: Some(role.to_string()),
                department: Some(department.to_string()),
                region: None,
                avatar_url: None,
            });
        }

        backend.require_unique("dealers", "phone");
        backend.require_unique("farmers", "phone");
        backend
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fixture controls
    // ─────────────────────────────────────────────────────────────────────────

    pub fn seed_identity(&self, email: &str, password: &str, subject: &str) {
        self.identities.insert(
            email.to_string(),
            Identity {
                password: password.to_string(),
                subject: SubjectId::new(subject),
            },
        );
    }

    pub fn seed_profile(&self, profile: Profile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Declare a unique column; inserts and updates that duplicate an
    /// existing non-null value fail with a constraint violation.
    pub fn require_unique(&self, resource: &str, column: &str) {
        self.unique_columns
            .entry(resource.to_string())
            .or_default()
            .push(column.to_string());
    }

    /// Reject every write to a resource the way a row-level policy would.
    pub fn deny_writes(&self, resource: &str) {
        self.write_denied.insert(resource.to_string());
    }

    /// Rows currently stored for a resource, unfiltered.
    pub fn rows(&self, resource: &str) -> Vec<Record> {
        self.tables
            .get(resource)
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Keys of every object uploaded so far, as `bucket/key` strings.
    pub fn uploaded_objects(&self) -> Vec<String> {
        self.uploads.iter().map(|e| e.key().clone()).collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn check_write_allowed(&self, resource: &str) -> Result<()> {
        if self.write_denied.contains(resource) {
            return Err(FieldgateError::permission_denied());
        }
        Ok(())
    }

    fn check_unique(
        &self,
        resource: &str,
        rows: &[Record],
        fields: &Record,
        skip_id: Option<&str>,
    ) -> Result<()> {
        let Some(columns) = self.unique_columns.get(resource) else {
            return Ok(());
        };
        for column in columns.iter() {
            let Some(candidate) = fields.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            let duplicate = rows.iter().any(|row| {
                row.get(column) == Some(candidate)
                    && skip_id != row.get("id").and_then(Value::as_str)
            });
            if duplicate {
                return Err(FieldgateError::constraint_violation(format!(
                    "duplicate value for unique column {}.{}",
                    resource, column
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for MemoryBackend {
    async fn list(&self, resource: &str, options: &QueryOptions) -> Result<Vec<Record>> {
        let mut rows: Vec<Record> = self
            .tables
            .get(resource)
            .map(|t| t.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|row| {
                options
                    .effective_filters()
                    .all(|(column, value)| row.get(column) == Some(value))
            })
            .collect();

        if let Some(order) = &options.order_by {
            rows.sort_by(|a, b| {
                let cmp = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    cmp
                } else {
                    cmp.reverse()
                }
            });
        }
        if let Some(limit) = options.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, resource: &str, mut fields: Record) -> Result<Record> {
        self.check_write_allowed(resource)?;

        let mut table = self.tables.entry(resource.to_string()).or_default();
        self.check_unique(resource, &table, &fields, None)?;

        if !fields.contains_key("id") {
            fields.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        fields
            .entry("created_at".to_string())
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        table.push(fields.clone());
        Ok(fields)
    }

    async fn update(&self, resource: &str, id: &str, fields: Record) -> Result<Record> {
        self.check_write_allowed(resource)?;

        let mut table = self
            .tables
            .get_mut(resource)
            .ok_or_else(|| FieldgateError::new(crate::error::ErrorCode::RecordNotFound, format!("no such record in {}", resource)))?;

        let snapshot = table.clone();
        self.check_unique(resource, &snapshot, &fields, Some(id))?;

        let row = table
            .iter_mut()
            .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| {
                FieldgateError::new(
                    crate::error::ErrorCode::RecordNotFound,
                    format!("no such record in {}", resource),
                )
            })?;

        for (k, v) in fields {
            row.insert(k, v);
        }
        Ok(row.clone())
    }

    async fn delete(&self, resource: &str, id: &str) -> Result<()> {
        self.check_write_allowed(resource)?;

        if let Some(mut table) = self.tables.get_mut(resource) {
            table.retain(|row| row.get("id").and_then(Value::as_str) != Some(id));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SubjectId> {
        let identity = self
            .identities
            .get(email)
            .filter(|i| i.password == password)
            .map(|i| i.clone())
            .ok_or_else(|| FieldgateError::authentication("invalid email or password"))?;

        *self.signed_in.write() = Some(identity.subject.clone());
        Ok(identity.subject)
    }

    async fn sign_out(&self) -> Result<()> {
        self.signed_in.write().take();
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn get_by_id(&self, subject_id: &str) -> Result<Option<Profile>> {
        Ok(self.profiles.get(subject_id).map(|p| p.clone()))
    }
}

#[async_trait]
impl FileStore for MemoryBackend {
    async fn upload(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<String> {
        let object = format!("{}/{}", bucket, key);
        self.uploads.insert(object.clone(), bytes.to_vec());
        Ok(format!("memory://{}", object))
    }
}

/// Total order over optional JSON values, for sorting list results. Nulls
/// and missing columns sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
