//! The Import Pipeline: uploaded file to committed records.
//!
//! One call to [`ImportPipeline::run`] walks the whole path: permission
//! gate, archival upload, parse, alias mapping, coercion, validation, and a
//! strictly sequential best-effort commit through the Data Gateway. Rows
//! that fail validation are dropped silently; rows the backend rejects get a
//! `Failed` outcome and the loop continues. The caller-facing summary is the
//! aggregate tally ("imported N of M"), with per-row detail retained in the
//! report for logging.
//!
//! There is no natural-key deduplication: importing the same file twice
//! commits two independent sets (subject only to backend unique
//! constraints).

pub mod alias;
pub mod drafts;
pub mod file;

pub use drafts::{DealerDirectory, DealerDraft, Draft, FarmerDraft, ImportTarget, OrderDraft};
pub use file::{ImportFile, RawRow};

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::ImportConfig;
use crate::error::{ErrorCode, FieldgateError, Result};
use crate::gateway::{DataGateway, QueryOptions};
use crate::rbac::{AccessControl, Session};
use crate::store::FileStore;

// ─────────────────────────────────────────────────────────────────────────────
// States and report
// ─────────────────────────────────────────────────────────────────────────────

/// Observable pipeline state. Linear except for `Failed`, which any stage
/// can jump to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Reading,
    Parsing,
    Mapping,
    Coercing,
    Validating,
    Committing,
    Completed,
    Failed,
}

/// Outcome of a single data row, indexed from the first row below the
/// header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOutcome {
    pub row_index: usize,
    pub result: RowResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowResult {
    /// Committed; carries the backend-assigned id when one came back.
    Inserted { id: Option<String> },
    /// Rejected by validation, silently.
    Dropped { reason: String },
    /// Submitted but rejected by the backend.
    Failed { code: ErrorCode, message: String },
}

/// The user-facing tally: "imported `success_count` of `total_rows`".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateImportResult {
    pub success_count: usize,
    pub total_rows: usize,
}

/// Full result of one import job.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub outcomes: Vec<RowOutcome>,
    pub summary: AggregateImportResult,
    /// Where the original upload was archived, when archival succeeded.
    pub archived_url: Option<String>,
    /// Whether the commit loop was cut short by cancellation.
    pub cancelled: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// The Import Pipeline.
#[derive(Clone)]
pub struct ImportPipeline {
    gateway: DataGateway,
    access: AccessControl,
    files: Arc<dyn FileStore>,
    archive_bucket: String,
    list_delimiter: char,
    state: Arc<RwLock<ImportState>>,
}

impl ImportPipeline {
    pub fn new(
        gateway: DataGateway,
        access: AccessControl,
        files: Arc<dyn FileStore>,
        config: &ImportConfig,
    ) -> Self {
        Self {
            gateway,
            access,
            files,
            archive_bucket: config.archive_bucket.clone(),
            list_delimiter: config.list_delimiter,
            state: Arc::new(RwLock::new(ImportState::Idle)),
        }
    }

    /// Current pipeline state.
    pub fn state(&self) -> ImportState {
        *self.state.read()
    }

    fn enter(&self, state: ImportState) {
        *self.state.write() = state;
    }

    fn fail(&self, error: FieldgateError) -> FieldgateError {
        self.enter(ImportState::Failed);
        error
    }

    /// Run one import job end to end.
    ///
    /// File-level failures (permission, format, empty file) abort with an
    /// error; row-level failures never do. Cancellation stops further
    /// submissions after the in-flight row completes; rows already committed
    /// stay committed.
    #[instrument(skip(self, session, file, cancel), fields(target = %target, file = %file.name))]
    pub async fn run(
        &self,
        session: &Session,
        target: ImportTarget,
        file: ImportFile,
        cancel: &CancellationToken,
    ) -> Result<ImportReport> {
        self.enter(ImportState::Reading);

        let principal = session.principal();
        if !self
            .access
            .has_permission(principal, target.required_permission())
        {
            warn!(principal = %principal.id, "Import refused: missing create permission");
            return Err(self.fail(FieldgateError::permission_denied()));
        }

        let archived_url = self.archive(target, &file).await;

        self.enter(ImportState::Parsing);
        let rows = file::parse(&file).map_err(|e| self.fail(e))?;
        let total_rows = rows.len();

        self.enter(ImportState::Mapping);
        let mut drafts: Vec<Draft> = rows
            .iter()
            .map(|row| Draft::from_row(target, row, principal, self.list_delimiter))
            .collect();

        self.enter(ImportState::Coercing);
        if target == ImportTarget::Orders {
            let dealers = self
                .gateway
                .list("dealers", &QueryOptions::new())
                .await
                .map_err(|e| self.fail(e))?;
            let directory = DealerDirectory::from_records(&dealers);
            for draft in &mut drafts {
                directory.resolve(draft);
            }
        }

        self.enter(ImportState::Validating);
        let mut outcomes: Vec<RowOutcome> = Vec::with_capacity(total_rows);
        let mut queue: Vec<(usize, Draft)> = Vec::new();
        for (row_index, draft) in drafts.into_iter().enumerate() {
            match draft.validate() {
                Ok(()) => queue.push((row_index, draft)),
                Err(e) => outcomes.push(RowOutcome {
                    row_index,
                    result: RowResult::Dropped {
                        reason: e.user_message().to_string(),
                    },
                }),
            }
        }

        self.enter(ImportState::Committing);
        let mut cancelled = false;
        let mut success_count = 0;
        for (row_index, draft) in queue {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            // One row at a time, each awaited, in file order.
            let result = match self.gateway.create(target.resource(), draft.into_record()).await
            {
                Ok(record) => {
                    success_count += 1;
                    RowResult::Inserted {
                        id: record
                            .get("id")
                            .and_then(serde_json::Value::as_str)
                            .map(str::to_string),
                    }
                }
                Err(e) => {
                    e.log();
                    RowResult::Failed {
                        code: e.code(),
                        message: e.user_message().to_string(),
                    }
                }
            };
            outcomes.push(RowOutcome { row_index, result });
        }
        outcomes.sort_by_key(|o| o.row_index);

        for outcome in &outcomes {
            let label = match outcome.result {
                RowResult::Inserted { .. } => "inserted",
                RowResult::Dropped { .. } => "dropped",
                RowResult::Failed { .. } => "failed",
            };
            counter!("fieldgate_import_rows_total", "outcome" => label).increment(1);
        }

        self.enter(ImportState::Completed);
        info!(
            imported = success_count,
            total = total_rows,
            cancelled = cancelled,
            "Import complete"
        );

        Ok(ImportReport {
            outcomes,
            summary: AggregateImportResult {
                success_count,
                total_rows,
            },
            archived_url,
            cancelled,
        })
    }

    /// Archive the original upload. Independent of the commit path: failure
    /// is logged and the job proceeds without an archive URL.
    async fn archive(&self, target: ImportTarget, file: &ImportFile) -> Option<String> {
        let key = format!(
            "{}/{}_{}",
            target.resource(),
            Utc::now().format("%Y%m%dT%H%M%S%.3f"),
            file.name
        );
        match self.files.upload(&self.archive_bucket, &key, &file.bytes).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, file = %file.name, "Archival upload failed; continuing import");
                None
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::rbac::{Credentials, RoleRegistry};
    use crate::store::{MemoryBackend, MemorySessionStore, ResourceStore};

    struct Fixture {
        pipeline: ImportPipeline,
        access: AccessControl,
        backend: Arc<MemoryBackend>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::with_demo_seed());
        let access = AccessControl::new(
            backend.clone(),
            backend.clone(),
            Arc::new(MemorySessionStore::new()),
            RoleRegistry::builtin(),
        );
        let gateway = DataGateway::new(backend.clone(), &CacheConfig::default());
        let pipeline = ImportPipeline::new(
            gateway,
            access.clone(),
            backend.clone(),
            &ImportConfig::default(),
        );
        Fixture {
            pipeline,
            access,
            backend,
        }
    }

    async fn sign_in(access: &AccessControl, email: &str) -> Session {
        access
            .authenticate(&Credentials::new(email, "demo1234"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_permission_gate_refuses_wrong_role() {
        let fx = fixture();
        let session = sign_in(&fx.access, "hr@demo.test").await;

        let err = fx
            .pipeline
            .run(
                &session,
                ImportTarget::Farmers,
                ImportFile::new("farmers.csv", b"name\nRamesh\n".to_vec()),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert_eq!(fx.pipeline.state(), ImportState::Failed);
        assert!(fx.backend.rows("farmers").is_empty());
    }

    #[tokio::test]
    async fn test_import_archives_and_commits() {
        let fx = fixture();
        let session = sign_in(&fx.access, "field@demo.test").await;

        let report = fx
            .pipeline
            .run(
                &session,
                ImportTarget::Farmers,
                ImportFile::new(
                    "farmers.csv",
                    b"name,phone,village\nRamesh,9999999999,Kothapet\n".to_vec(),
                ),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.summary.success_count, 1);
        assert_eq!(report.summary.total_rows, 1);
        assert!(!report.cancelled);
        assert!(report.archived_url.is_some());
        assert_eq!(fx.pipeline.state(), ImportState::Completed);

        let rows = fx.backend.rows("farmers");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&serde_json::json!("Ramesh")));
        assert_eq!(rows[0].get("crops"), Some(&serde_json::json!([])));
        assert_eq!(
            rows[0].get("created_by"),
            Some(&serde_json::json!("subject-field"))
        );
    }

    #[tokio::test]
    async fn test_invalid_rows_dropped_silently() {
        let fx = fixture();
        let session = sign_in(&fx.access, "field@demo.test").await;

        let report = fx
            .pipeline
            .run(
                &session,
                ImportTarget::Farmers,
                ImportFile::new(
                    "farmers.csv",
                    b"name,phone\nRamesh,1\n,2\nSita,3\n".to_vec(),
                ),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.summary.success_count, 2);
        assert_eq!(report.summary.total_rows, 3);
        assert_eq!(
            report.outcomes[1].result,
            RowResult::Dropped {
                reason: "Required field is missing: name".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_commit_is_best_effort_past_backend_rejections() {
        let fx = fixture();
        let session = sign_in(&fx.access, "field@demo.test").await;

        // Seeded fixture declares farmers.phone unique; rows 1 and 2 collide.
        let report = fx
            .pipeline
            .run(
                &session,
                ImportTarget::Farmers,
                ImportFile::new(
                    "farmers.csv",
                    b"name,phone\nRamesh,111\nSita,111\nGita,222\n".to_vec(),
                ),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.summary.success_count, 2);
        assert!(matches!(
            report.outcomes[1].result,
            RowResult::Failed {
                code: ErrorCode::ConstraintViolation,
                ..
            }
        ));
        assert_eq!(fx.backend.rows("farmers").len(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_stops_further_submissions() {
        let fx = fixture();
        let session = sign_in(&fx.access, "field@demo.test").await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = fx
            .pipeline
            .run(
                &session,
                ImportTarget::Farmers,
                ImportFile::new("farmers.csv", b"name\nRamesh\nSita\n".to_vec()),
                &cancel,
            )
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.summary.success_count, 0);
        assert!(fx.backend.rows("farmers").is_empty());
    }

    #[tokio::test]
    async fn test_archive_failure_does_not_abort() {
        let fx = fixture();
        let session = sign_in(&fx.access, "field@demo.test").await;

        // Separate file store that always fails.
        struct BrokenStore;
        #[async_trait::async_trait]
        impl FileStore for BrokenStore {
            async fn upload(&self, _: &str, _: &str, _: &[u8]) -> crate::error::Result<String> {
                Err(FieldgateError::network("storage unreachable"))
            }
        }

        let pipeline = ImportPipeline::new(
            DataGateway::new(fx.backend.clone(), &CacheConfig::default()),
            fx.access.clone(),
            Arc::new(BrokenStore),
            &ImportConfig::default(),
        );

        let report = pipeline
            .run(
                &session,
                ImportTarget::Farmers,
                ImportFile::new("farmers.csv", b"name\nRamesh\n".to_vec()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(report.archived_url.is_none());
        assert_eq!(report.summary.success_count, 1);
    }

    #[tokio::test]
    async fn test_order_import_resolves_dealer_names() {
        let fx = fixture();
        let session = sign_in(&fx.access, "sales@demo.test").await;

        let dealer = fx
            .backend
            .insert(
                "dealers",
                serde_json::json!({"name": "Acme Agro", "phone": "1", "business_name": "Acme Agro Traders"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
        let dealer_id = dealer.get("id").unwrap().as_str().unwrap().to_string();

        let report = fx
            .pipeline
            .run(
                &session,
                ImportTarget::Orders,
                ImportFile::new(
                    "orders.csv",
                    b"Dealer Name,Order Date,Total Amount,Discount Amount,Tax Amount\n\
                      acme agro,2026-02-01,1000,100,50\n\
                      Nobody & Sons,2026-02-01,500,0,0\n"
                        .to_vec(),
                ),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.summary.success_count, 1);
        assert_eq!(report.summary.total_rows, 2);
        assert!(matches!(
            report.outcomes[1].result,
            RowResult::Dropped { .. }
        ));

        let orders = fx.backend.rows("orders");
        assert_eq!(orders.len(), 1);
        assert_eq!(
            orders[0].get("dealer_id"),
            Some(&serde_json::json!(dealer_id))
        );
        assert_eq!(orders[0].get("net_amount"), Some(&serde_json::json!(950.0)));
    }

    #[tokio::test]
    async fn test_reimport_commits_independent_sets() {
        let fx = fixture();
        let session = sign_in(&fx.access, "field@demo.test").await;
        let file = || ImportFile::new("farmers.csv", b"name\nRamesh\n".to_vec());

        for _ in 0..2 {
            let report = fx
                .pipeline
                .run(
                    &session,
                    ImportTarget::Farmers,
                    file(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();
            assert_eq!(report.summary.success_count, 1);
        }
        assert_eq!(fx.backend.rows("farmers").len(), 2, "no natural-key dedup");
    }
}
