//! Core domain model for the review ingestion pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const CRATE_NAME: &str = "revin-core";

/// Rating scale bounds, enforced by validation and again by the permanent
/// table's CHECK constraint.
pub const RATING_MIN: i16 = 1;
pub const RATING_MAX: i16 = 5;

/// Placeholder author for reviews submitted without a display name.
pub const ANONYMOUS_AUTHOR: &str = "Anonymous";

/// Sentinel version tag for reviews that carry no application version.
pub const UNKNOWN_VERSION: &str = "unknown";

/// A review as the remote feed returns it: loosely typed, every field
/// optional. Numeric fields stay as raw JSON values so the validator owns
/// every coercion decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawReview {
    pub review_id: Option<String>,
    pub user_name: Option<String>,
    pub content: Option<String>,
    pub score: Option<Value>,
    pub thumbs_up_count: Option<Value>,
    #[serde(rename = "at")]
    pub submitted_at: Option<Value>,
    pub app_version: Option<String>,
}

/// Canonical, validated review. Immutable once persisted: a later fetch of
/// the same `id` never updates the stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: String,
    pub author: String,
    pub content: String,
    pub rating: i16,
    pub helpfulness_count: i32,
    /// Submission instant normalized to UTC, stored without a zone.
    pub submitted_at: NaiveDateTime,
    pub source_version: String,
}

/// Why a raw review was dropped during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    DuplicateId,
    MissingId,
    EmptyContent,
    OversizeContent,
    UnparsableRating,
    RatingOutOfRange,
    UnparsableTimestamp,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::DuplicateId => "duplicate_id",
            DropReason::MissingId => "missing_id",
            DropReason::EmptyContent => "empty_content",
            DropReason::OversizeContent => "oversize_content",
            DropReason::UnparsableRating => "unparsable_rating",
            DropReason::RatingOutOfRange => "rating_out_of_range",
            DropReason::UnparsableTimestamp => "unparsable_timestamp",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-reason histogram of validation drops. Reported on every run, even
/// when nothing was dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DropTally {
    counts: BTreeMap<DropReason, usize>,
}

impl DropTally {
    pub fn record(&mut self, reason: DropReason) {
        *self.counts.entry(reason).or_default() += 1;
    }

    pub fn count(&self, reason: DropReason) -> usize {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn counts(&self) -> impl Iterator<Item = (DropReason, usize)> + '_ {
        self.counts.iter().map(|(reason, count)| (*reason, *count))
    }
}

/// One run's worth of validated records plus fetch provenance. Created by
/// the validator, consumed by the stager and merger, never persisted as its
/// own entity.
#[derive(Debug, Clone)]
pub struct IngestionBatch {
    pub run_id: Uuid,
    pub app_id: String,
    pub requested: usize,
    pub fetched_at: DateTime<Utc>,
    pub records: Vec<ReviewRecord>,
    pub dropped: DropTally,
}
