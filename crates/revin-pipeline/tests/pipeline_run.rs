//! End-to-end pipeline runs against a scripted source and the in-process
//! store, covering idempotency, immutability, drop accounting, and cleanup.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use revin_core::RawReview;
use revin_pipeline::{IngestConfig, IngestError, IngestPipeline, ValidationLimits};
use revin_source::{ReviewSource, SourceError};
use revin_store::snapshot::SnapshotError;
use revin_store::{DurableStore, LandingTable, MemoryStore, StoreError};
use serde_json::json;

fn raw(id: &str, content: &str, score: i64, thumbs: i64) -> RawReview {
    RawReview {
        review_id: Some(id.to_string()),
        user_name: Some("pat".to_string()),
        content: Some(content.to_string()),
        score: Some(json!(score)),
        thumbs_up_count: Some(json!(thumbs)),
        submitted_at: Some(json!("2026-07-01T10:00:00Z")),
        app_version: Some("3.1.0".to_string()),
    }
}

enum Reply {
    Reviews(Vec<RawReview>),
    Unavailable,
}

/// Returns one scripted reply per fetch, then empty batches.
struct ScriptedSource {
    replies: Mutex<VecDeque<Reply>>,
}

impl ScriptedSource {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ReviewSource for ScriptedSource {
    async fn fetch_newest(
        &self,
        _app_id: &str,
        max_count: usize,
    ) -> Result<Vec<RawReview>, SourceError> {
        match self.replies.lock().expect("replies lock").pop_front() {
            Some(Reply::Reviews(mut reviews)) => {
                reviews.truncate(max_count);
                Ok(reviews)
            }
            Some(Reply::Unavailable) => Err(SourceError::HttpStatus {
                status: 503,
                url: "http://feed.test/reviews".to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Delegates the landing lifecycle but fails the merge step.
struct FailingMerge {
    inner: MemoryStore,
}

#[async_trait]
impl DurableStore for FailingMerge {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.inner.ensure_schema().await
    }

    async fn create_landing(&self, landing: &LandingTable) -> Result<(), StoreError> {
        self.inner.create_landing(landing).await
    }

    async fn load_landing(
        &self,
        landing: &LandingTable,
        snapshot: &Path,
    ) -> Result<u64, StoreError> {
        self.inner.load_landing(landing, snapshot).await
    }

    async fn merge_landing(&self, _landing: &LandingTable) -> Result<u64, StoreError> {
        Err(StoreError::Snapshot(SnapshotError::Io(
            std::io::Error::other("injected merge failure"),
        )))
    }

    async fn drop_landing(&self, landing: &LandingTable) -> Result<(), StoreError> {
        self.inner.drop_landing(landing).await
    }
}

fn config(staging_dir: &Path) -> IngestConfig {
    IngestConfig {
        app_id: "com.example.app".to_string(),
        max_reviews: 100,
        staging_dir: staging_dir.to_path_buf(),
        limits: ValidationLimits::default(),
    }
}

fn staged_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn first_run_inserts_every_valid_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedSource::new(vec![Reply::Reviews(vec![
        raw("a", "love it", 5, 2),
        raw("b", "fine", 4, 0),
        raw("c", "meh", 2, 1),
    ])]));
    let pipeline = IngestPipeline::new(config(dir.path()), source, store.clone());

    let report = pipeline.run_once().await.expect("run");

    assert_eq!(report.rows_fetched, 3);
    assert_eq!(report.rows_staged, 3);
    assert_eq!(report.rows_inserted, 3);
    assert_eq!(report.rows_skipped_existing, 0);
    assert_eq!(report.rows_dropped(), 0);
    assert_eq!(store.row_count().await, 3);
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn replaying_the_same_batch_inserts_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let batch = vec![
        raw("a", "love it", 5, 2),
        raw("b", "fine", 4, 0),
        raw("c", "meh", 2, 1),
    ];
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedSource::new(vec![
        Reply::Reviews(batch.clone()),
        Reply::Reviews(batch),
    ]));
    let pipeline = IngestPipeline::new(config(dir.path()), source, store.clone());

    let first = pipeline.run_once().await.expect("first run");
    let second = pipeline.run_once().await.expect("second run");

    assert_eq!(first.rows_inserted, 3);
    assert_eq!(second.rows_inserted, 0);
    assert_eq!(second.rows_skipped_existing, 3);
    assert_eq!(store.row_count().await, 3);
}

#[tokio::test]
async fn reingested_record_keeps_its_originally_stored_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedSource::new(vec![
        Reply::Reviews(vec![raw("a", "original text", 5, 2)]),
        Reply::Reviews(vec![raw("a", "edited text", 1, 40)]),
    ]));
    let pipeline = IngestPipeline::new(config(dir.path()), source, store.clone());

    pipeline.run_once().await.expect("first run");
    let second = pipeline.run_once().await.expect("second run");

    assert_eq!(second.rows_inserted, 0);
    let stored = store.get("a").await.expect("row a");
    assert_eq!(stored.content, "original text");
    assert_eq!(stored.rating, 5);
    assert_eq!(stored.helpfulness_count, 2);
}

#[tokio::test]
async fn invalid_rating_is_dropped_not_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedSource::new(vec![Reply::Reviews(vec![
        raw("a", "ok", 4, 0),
        raw("b", "impossible", 7, 0),
    ])]));
    let pipeline = IngestPipeline::new(config(dir.path()), source, store.clone());

    let report = pipeline.run_once().await.expect("run");

    assert_eq!(report.rows_fetched, 2);
    assert_eq!(report.rows_dropped(), 1);
    assert_eq!(report.rows_inserted, 1);
    assert_eq!(store.row_count().await, 1);
}

#[tokio::test]
async fn source_outage_aborts_before_any_mutation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedSource::new(vec![Reply::Unavailable]));
    let pipeline = IngestPipeline::new(config(dir.path()), source, store.clone());

    let err = pipeline.run_once().await.expect_err("run should abort");

    assert!(matches!(err, IngestError::SourceUnavailable(_)));
    assert_eq!(store.row_count().await, 0);
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn empty_fetch_is_a_successful_noop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedSource::new(vec![Reply::Reviews(Vec::new())]));
    let pipeline = IngestPipeline::new(config(dir.path()), source, store.clone());

    let report = pipeline.run_once().await.expect("run");

    assert_eq!(report.rows_fetched, 0);
    assert_eq!(report.rows_inserted, 0);
    assert_eq!(store.row_count().await, 0);
}

#[tokio::test]
async fn all_records_invalid_is_a_warning_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedSource::new(vec![Reply::Reviews(vec![
        raw("a", "", 4, 0),
        raw("b", "ok", 11, 0),
    ])]));
    let pipeline = IngestPipeline::new(config(dir.path()), source, store.clone());

    let report = pipeline.run_once().await.expect("run");

    assert_eq!(report.rows_fetched, 2);
    assert_eq!(report.rows_dropped(), 2);
    assert_eq!(report.rows_inserted, 0);
    assert_eq!(store.row_count().await, 0);
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn accounting_adds_up_across_mixed_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedSource::new(vec![
        Reply::Reviews(vec![raw("a", "ok", 5, 0), raw("b", "ok", 4, 0)]),
        Reply::Reviews(vec![
            raw("a", "seen before", 5, 3),
            raw("c", "new", 3, 0),
            raw("c", "in-batch duplicate", 3, 0),
            raw("d", "bad rating", 0, 0),
        ]),
    ]));
    let pipeline = IngestPipeline::new(config(dir.path()), source, store.clone());

    pipeline.run_once().await.expect("first run");
    let report = pipeline.run_once().await.expect("second run");

    assert_eq!(report.rows_fetched, 4);
    assert_eq!(report.rows_inserted, 1);
    assert_eq!(report.rows_skipped_existing, 1);
    assert_eq!(report.rows_dropped(), 2);
    assert_eq!(
        report.rows_fetched,
        report.rows_inserted as usize
            + report.rows_skipped_existing as usize
            + report.rows_dropped()
    );
    assert_eq!(store.row_count().await, 3);
}

#[tokio::test]
async fn merge_failure_still_cleans_up_staging_and_landing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(FailingMerge {
        inner: MemoryStore::new(),
    });
    let source = Arc::new(ScriptedSource::new(vec![Reply::Reviews(vec![raw(
        "a", "ok", 4, 0,
    )])]));
    let pipeline = IngestPipeline::new(config(dir.path()), source, store.clone());

    let err = pipeline.run_once().await.expect_err("run should abort");

    assert!(matches!(err, IngestError::MergeFailed(_)));
    assert_eq!(store.inner.row_count().await, 0);
    assert!(store.inner.landing_tables().await.is_empty());
    assert_eq!(staged_files(dir.path()), 0);
}
