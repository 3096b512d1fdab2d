use crate::config::SourceConfig;
use anyhow::{bail, Result};
use sluice::RetryPolicy;

pub const BASE_URL: &str = "https://api.stripe.com/v1";
pub const PAGE_SIZE: usize = 100;
pub const RETRY_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Stripe access settings.
///
/// Options: `api_key` (or `STRIPE_API_KEY`) and `chunks`, the number of
/// equal `created` windows a bounded incremental range is read in
/// (default 1).
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub api_key: String,
    pub chunks: u32,
}

impl StripeConfig {
    pub fn from_source(source: &SourceConfig) -> Result<Self> {
        let chunks = match source.option_int("chunks") {
            None => 1,
            Some(n) if n > 0 && n <= i64::from(u32::MAX) => n as u32,
            Some(n) => bail!("invalid Stripe `chunks` option {}, expected a positive number", n),
        };
        Ok(Self {
            api_key: source.api_key()?,
            chunks,
        })
    }
}

pub fn retry_policy() -> RetryPolicy {
    RetryPolicy::transient(RETRY_STATUSES.iter().copied())
}
