use crate::config::SourceConfig;
use anyhow::Result;
use sluice::RetryPolicy;

pub const BASE_URL: &str = "https://api.hostaway.com/v1";
pub const PAGE_SIZE: usize = 100;
pub const RETRY_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Hostaway access settings. Options: `api_key` (or `HOSTAWAY_API_KEY`),
/// an access token obtained from the client-credentials flow.
#[derive(Debug, Clone)]
pub struct HostawayConfig {
    pub access_token: String,
}

impl HostawayConfig {
    pub fn from_source(source: &SourceConfig) -> Result<Self> {
        Ok(Self {
            access_token: source.api_key()?,
        })
    }
}

pub fn retry_policy() -> RetryPolicy {
    RetryPolicy::transient(RETRY_STATUSES.iter().copied())
}
