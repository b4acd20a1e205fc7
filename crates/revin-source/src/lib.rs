//! Review source contracts + fetch implementations.

mod fixture;
mod http;

pub use fixture::FixtureReviewSource;
pub use http::{
    classify_request_error, classify_status, BackoffPolicy, HttpReviewSource, HttpSourceConfig,
    RetryDisposition,
};

use std::path::PathBuf;

use async_trait::async_trait;
use revin_core::RawReview;
use thiserror::Error;

pub const CRATE_NAME: &str = "revin-source";

/// Failure reaching or decoding the review feed. Any of these aborts the
/// run before validation or staging happens; there are no partial results.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("decoding review feed response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("reading fixture {path}: {source}")]
    Fixture {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Capability returning up to `max_count` of the most recent reviews for an
/// application, newest first. Implementations make no delivery guarantees:
/// fetch windows may overlap between calls and the same record can reappear.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    async fn fetch_newest(
        &self,
        app_id: &str,
        max_count: usize,
    ) -> Result<Vec<RawReview>, SourceError>;
}
