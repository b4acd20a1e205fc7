//! File-backed review source for offline runs and tests.

use std::path::PathBuf;

use async_trait::async_trait;
use revin_core::RawReview;

use crate::{ReviewSource, SourceError};

/// Reads a JSON array of raw reviews from disk. The file is assumed to be
/// ordered newest-first, like the remote feed.
#[derive(Debug, Clone)]
pub struct FixtureReviewSource {
    path: PathBuf,
}

impl FixtureReviewSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReviewSource for FixtureReviewSource {
    async fn fetch_newest(
        &self,
        _app_id: &str,
        max_count: usize,
    ) -> Result<Vec<RawReview>, SourceError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| SourceError::Fixture {
            path: self.path.clone(),
            source,
        })?;
        let mut reviews: Vec<RawReview> =
            serde_json::from_str(&text).map_err(SourceError::Decode)?;
        reviews.truncate(max_count);
        Ok(reviews)
    }
}
