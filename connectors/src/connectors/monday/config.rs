use crate::config::SourceConfig;
use anyhow::Result;
use sluice::RetryPolicy;

pub const GRAPHQL_URL: &str = "https://api.monday.com/v2";

/// Hard maximum of the API for `limit`.
pub const PAGE_SIZE: usize = 100;

pub const RETRY_STATUSES: &[u16] = &[429, 502, 503];

/// monday.com access settings. Options: `api_key` (or `MONDAY_API_KEY`).
#[derive(Debug, Clone)]
pub struct MondayConfig {
    pub api_token: String,
}

impl MondayConfig {
    pub fn from_source(source: &SourceConfig) -> Result<Self> {
        Ok(Self {
            api_token: source.api_key()?,
        })
    }
}

pub fn retry_policy() -> RetryPolicy {
    RetryPolicy::transient(RETRY_STATUSES.iter().copied())
}
