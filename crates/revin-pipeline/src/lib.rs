//! Batch review ingestion: extract, validate, stage, merge.

pub mod merge;
pub mod stage;
pub mod validate;

pub use merge::{MergeOutcome, MergePhase};
pub use stage::{SnapshotStager, StagedSnapshot, StagingError};
pub use validate::{BatchDefect, ValidationLimits};

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use revin_core::DropTally;
use revin_source::{ReviewSource, SourceError};
use revin_store::{DurableStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "revin-pipeline";

/// Fatal pipeline failures. Per-record defects are absorbed by validation
/// and tallied; only structural problems surface here, each naming the
/// stage that failed.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("review source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),
    #[error("fetched batch is structurally unusable: {0}")]
    Structural(#[from] BatchDefect),
    #[error("staging failed: {0}")]
    Staging(#[from] StagingError),
    #[error("durable store unavailable: {0}")]
    StoreUnavailable(StoreError),
    #[error("bulk load into landing table failed: {0}")]
    LoadFailed(StoreError),
    #[error("merge into permanent table failed: {0}")]
    MergeFailed(StoreError),
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub app_id: String,
    pub max_reviews: usize,
    pub staging_dir: PathBuf,
    pub limits: ValidationLimits,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self {
            app_id: std::env::var("APP_ID").unwrap_or_else(|_| "com.example.app".to_string()),
            max_reviews: std::env::var("REVIEWS_TO_FETCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            staging_dir: std::env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./staging")),
            limits: ValidationLimits {
                max_content_chars: std::env::var("MAX_CONTENT_CHARS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| ValidationLimits::default().max_content_chars),
            },
        }
    }
}

/// Per-run accounting. `rows_fetched` always equals
/// `rows_inserted + rows_skipped_existing + dropped.total()`.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub app_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows_fetched: usize,
    pub rows_staged: usize,
    pub rows_inserted: u64,
    pub rows_skipped_existing: u64,
    pub dropped: DropTally,
}

impl IngestReport {
    pub fn rows_dropped(&self) -> usize {
        self.dropped.total()
    }
}

pub struct IngestPipeline {
    config: IngestConfig,
    source: Arc<dyn ReviewSource>,
    store: Arc<dyn DurableStore>,
}

impl IngestPipeline {
    pub fn new(
        config: IngestConfig,
        source: Arc<dyn ReviewSource>,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        Self {
            config,
            source,
            store,
        }
    }

    /// Run the pipeline once: fetch up to `max_reviews` newest records,
    /// validate, stage, and merge. The staging snapshot and landing table
    /// are released on every exit path.
    pub async fn run_once(&self) -> Result<IngestReport, IngestError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            app_id = %self.config.app_id,
            requested = self.config.max_reviews,
            "starting ingestion run"
        );

        let raws = self
            .source
            .fetch_newest(&self.config.app_id, self.config.max_reviews)
            .await?;
        let rows_fetched = raws.len();
        let fetched_at = Utc::now();

        if raws.is_empty() {
            info!(%run_id, "review source returned no records; nothing to ingest");
            return Ok(self.report(run_id, started_at, 0, 0, 0, 0, DropTally::default()));
        }

        let batch = validate::build_batch(
            run_id,
            &self.config.app_id,
            self.config.max_reviews,
            fetched_at,
            raws,
            &self.config.limits,
        )?;

        if batch.records.is_empty() {
            warn!(
                %run_id,
                dropped = batch.dropped.total(),
                "validation dropped every fetched record"
            );
            return Ok(self.report(run_id, started_at, rows_fetched, 0, 0, 0, batch.dropped));
        }

        self.store
            .ensure_schema()
            .await
            .map_err(IngestError::StoreUnavailable)?;

        let stager = SnapshotStager::new(&self.config.staging_dir);
        let mut snapshot = stager.stage(&batch)?;
        let rows_staged = snapshot.rows();

        let merged = merge::merge_snapshot(self.store.as_ref(), run_id, snapshot.path()).await;
        // Staging release happens whether or not the merge succeeded.
        if let Err(err) = snapshot.remove() {
            warn!(%run_id, error = %err, "failed to remove staging snapshot");
        }
        let outcome = merged?;

        let rows_skipped = (rows_staged as u64).saturating_sub(outcome.rows_inserted);
        let report = self.report(
            run_id,
            started_at,
            rows_fetched,
            rows_staged,
            outcome.rows_inserted,
            rows_skipped,
            batch.dropped,
        );
        info!(
            %run_id,
            rows_fetched = report.rows_fetched,
            rows_dropped = report.rows_dropped(),
            rows_inserted = report.rows_inserted,
            rows_skipped_existing = report.rows_skipped_existing,
            "ingestion run complete"
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        rows_fetched: usize,
        rows_staged: usize,
        rows_inserted: u64,
        rows_skipped_existing: u64,
        dropped: DropTally,
    ) -> IngestReport {
        IngestReport {
            run_id,
            app_id: self.config.app_id.clone(),
            started_at,
            finished_at: Utc::now(),
            rows_fetched,
            rows_staged,
            rows_inserted,
            rows_skipped_existing,
            dropped,
        }
    }
}
