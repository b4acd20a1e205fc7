//! HTTP review feed client with bounded retry/backoff.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use revin_core::RawReview;
use serde::Deserialize;
use tracing::debug;

use crate::{ReviewSource, SourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_request_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

/// Exponential backoff: base_delay * 2^attempt, capped at max_delay.
/// Retries are safe here because the downstream merge is idempotent.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub base_url: String,
    pub user_agent: Option<String>,
    pub timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            user_agent: None,
            timeout: Duration::from_secs(20),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl HttpSourceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("REVIN_SOURCE_URL").unwrap_or(defaults.base_url),
            user_agent: std::env::var("REVIN_USER_AGENT").ok(),
            timeout: std::env::var("REVIN_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            backoff: BackoffPolicy {
                max_retries: std::env::var("REVIN_HTTP_MAX_RETRIES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.backoff.max_retries),
                ..defaults.backoff
            },
        }
    }
}

/// Review feed response envelope.
#[derive(Debug, Deserialize)]
struct ReviewsPage {
    #[serde(default)]
    reviews: Vec<RawReview>,
}

#[derive(Debug)]
pub struct HttpReviewSource {
    client: reqwest::Client,
    base_url: String,
    backoff: BackoffPolicy,
}

impl HttpReviewSource {
    pub fn new(config: HttpSourceConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            backoff: config.backoff,
        })
    }

    fn reviews_url(&self, app_id: &str, max_count: usize) -> String {
        format!(
            "{}/apps/{}/reviews?count={}&sort=newest",
            self.base_url, app_id, max_count
        )
    }
}

#[async_trait]
impl ReviewSource for HttpReviewSource {
    async fn fetch_newest(
        &self,
        app_id: &str,
        max_count: usize,
    ) -> Result<Vec<RawReview>, SourceError> {
        let url = self.reviews_url(app_id, max_count);
        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            debug!(%url, attempt, "fetching review feed");

            match self.client.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let body = resp.bytes().await?;
                        let page: ReviewsPage =
                            serde_json::from_slice(&body).map_err(SourceError::Decode)?;
                        let mut reviews = page.reviews;
                        reviews.truncate(max_count);
                        return Ok(reviews);
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(SourceError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_request_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(SourceError::Request(err));
                }
            }
        }

        Err(SourceError::Request(
            last_request_error.expect("retry loop always captures the last request error"),
        ))
    }
}
