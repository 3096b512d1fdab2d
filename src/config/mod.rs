//! Serde-friendly settings for the fetch engine.
//!
//! These are embedded in connector configuration files; every field has a
//! default so a section can be partial or missing entirely.

use crate::http::RetryPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Retry behavior for one connector's HTTP client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_statuses")]
    pub statuses: Vec<u16>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_respect_retry_after")]
    pub respect_retry_after: bool,
}

fn default_statuses() -> Vec<u16> {
    vec![502]
}

fn default_max_attempts() -> u32 {
    12
}

fn default_backoff_ms() -> u64 {
    10_000
}

fn default_max_backoff_ms() -> u64 {
    300_000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_respect_retry_after() -> bool {
    true
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            statuses: default_statuses(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            respect_retry_after: default_respect_retry_after(),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy::transient(settings.statuses.iter().copied())
            .with_max_attempts(settings.max_attempts)
            .with_backoff(
                Duration::from_millis(settings.backoff_ms),
                Duration::from_millis(settings.max_backoff_ms),
            )
            .with_timeout(Duration::from_secs(settings.timeout_secs))
            .respect_retry_after(settings.respect_retry_after)
    }
}

/// Session limits and throttling.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct FetchSettings {
    /// Pause between pages, in milliseconds.
    #[serde(default)]
    pub page_delay_ms: u64,
    /// Pause between time chunks, in milliseconds.
    #[serde(default)]
    pub chunk_delay_ms: u64,
    /// Stop a session after this many pages.
    #[serde(default)]
    pub max_pages: Option<u64>,
    /// Replaces the connector's built-in retry policy when present.
    #[serde(default)]
    pub retry: Option<RetrySettings>,
}

impl FetchSettings {
    pub fn page_delay(&self) -> Option<Duration> {
        (self.page_delay_ms > 0).then(|| Duration::from_millis(self.page_delay_ms))
    }

    pub fn chunk_delay(&self) -> Option<Duration> {
        (self.chunk_delay_ms > 0).then(|| Duration::from_millis(self.chunk_delay_ms))
    }

    /// The configured retry policy, or `fallback`.
    pub fn retry_policy(&self, fallback: RetryPolicy) -> RetryPolicy {
        self.retry.as_ref().map(RetryPolicy::from).unwrap_or(fallback)
    }
}
