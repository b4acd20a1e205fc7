//! Validation and normalization of raw reviews into canonical records.
//!
//! Individual bad rows are dropped and tallied, never fatal. The only fatal
//! outcome is a structural defect: a non-empty fetch in which no record
//! carries an identity key, which means the feed shape changed under us.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use revin_core::{
    DropReason, DropTally, IngestionBatch, RawReview, ReviewRecord, ANONYMOUS_AUTHOR, RATING_MAX,
    RATING_MIN, UNKNOWN_VERSION,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BatchDefect {
    #[error("none of the {input} fetched records carried an identity key")]
    MissingIdentityColumn { input: usize },
}

#[derive(Debug, Clone)]
pub struct ValidationLimits {
    pub max_content_chars: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_content_chars: 5000,
        }
    }
}

/// Canonicalize a fetched batch. Applies, per record and in order: in-batch
/// dedup by id (first occurrence wins), required-field checks, integer
/// coercion, rating range check, and timestamp normalization to UTC.
pub fn build_batch(
    run_id: Uuid,
    app_id: &str,
    requested: usize,
    fetched_at: DateTime<Utc>,
    raws: Vec<RawReview>,
    limits: &ValidationLimits,
) -> Result<IngestionBatch, BatchDefect> {
    let input = raws.len();
    if input > 0 && raws.iter().all(|raw| id_of(raw).is_none()) {
        return Err(BatchDefect::MissingIdentityColumn { input });
    }

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(input);
    let mut dropped = DropTally::default();

    for raw in &raws {
        match canonicalize(raw, &mut seen, limits) {
            Ok(record) => records.push(record),
            Err(reason) => dropped.record(reason),
        }
    }

    info!(
        input,
        kept = records.len(),
        dropped = dropped.total(),
        "validated fetched batch"
    );
    for (reason, count) in dropped.counts() {
        debug!(%reason, count, "dropped records");
    }

    Ok(IngestionBatch {
        run_id,
        app_id: app_id.to_string(),
        requested,
        fetched_at,
        records,
        dropped,
    })
}

fn id_of(raw: &RawReview) -> Option<&str> {
    raw.review_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn canonicalize(
    raw: &RawReview,
    seen: &mut HashSet<String>,
    limits: &ValidationLimits,
) -> Result<ReviewRecord, DropReason> {
    let id = id_of(raw).ok_or(DropReason::MissingId)?;
    // First occurrence claims the id, valid or not.
    if !seen.insert(id.to_string()) {
        return Err(DropReason::DuplicateId);
    }

    let content = raw.content.as_deref().map(str::trim).unwrap_or("");
    if content.is_empty() {
        return Err(DropReason::EmptyContent);
    }
    if content.chars().count() > limits.max_content_chars {
        return Err(DropReason::OversizeContent);
    }

    let rating = coerce_int(raw.score.as_ref()).ok_or(DropReason::UnparsableRating)?;
    if !(i64::from(RATING_MIN)..=i64::from(RATING_MAX)).contains(&rating) {
        return Err(DropReason::RatingOutOfRange);
    }

    let submitted_at = raw
        .submitted_at
        .as_ref()
        .and_then(parse_instant)
        .ok_or(DropReason::UnparsableTimestamp)?;

    // Lenient fields: never a reason to drop.
    let helpfulness_count = coerce_int(raw.thumbs_up_count.as_ref())
        .filter(|v| *v >= 0)
        .map(|v| v.min(i64::from(i32::MAX)) as i32)
        .unwrap_or(0);
    let author = raw
        .user_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ANONYMOUS_AUTHOR)
        .to_string();
    let source_version = raw
        .app_version
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_VERSION)
        .to_string();

    Ok(ReviewRecord {
        id: id.to_string(),
        author,
        content: content.to_string(),
        rating: rating as i16,
        helpfulness_count,
        submitted_at,
        source_version,
    })
}

/// Integer coercion over loose JSON: accepts integers, integral floats, and
/// numeric strings.
fn coerce_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Accepts RFC 3339 (offset folded into UTC), naive date-times (taken as
/// already UTC), and integer epoch seconds.
fn parse_instant(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.naive_utc());
            }
            for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(dt);
                }
            }
            None
        }
        Value::Number(n) => DateTime::from_timestamp(n.as_i64()?, 0).map(|dt| dt.naive_utc()),
        _ => None,
    }
}
