use crate::config::SourceConfig;
use anyhow::{bail, Result};
use sluice::RetryPolicy;

pub const US_BASE_URL: &str = "https://api.intercom.io";
pub const EU_BASE_URL: &str = "https://api.eu.intercom.io";
pub const AU_BASE_URL: &str = "https://api.au.intercom.io";

/// Sent as `Intercom-Version` on every request.
pub const API_VERSION: &str = "2.14";
pub const PAGE_SIZE: usize = 150;
pub const RETRY_STATUSES: &[u16] = &[429, 502, 503];

/// Intercom access settings.
///
/// Options: `api_key` (or `INTERCOM_API_KEY`), `region` (`us`, `eu` or
/// `au`, default `us`).
#[derive(Debug, Clone)]
pub struct IntercomConfig {
    pub access_token: String,
    pub region: String,
}

impl IntercomConfig {
    pub fn from_source(source: &SourceConfig) -> Result<Self> {
        let region = source.option_str("region").unwrap_or_else(|| "us".to_string());
        if region_base_url(&region).is_none() {
            bail!("invalid Intercom region `{}`, expected us, eu or au", region);
        }
        Ok(Self {
            access_token: source.api_key()?,
            region,
        })
    }

    pub fn base_url(&self) -> &'static str {
        region_base_url(&self.region).unwrap_or(US_BASE_URL)
    }
}

fn region_base_url(region: &str) -> Option<&'static str> {
    match region {
        "us" => Some(US_BASE_URL),
        "eu" => Some(EU_BASE_URL),
        "au" => Some(AU_BASE_URL),
        _ => None,
    }
}

pub fn retry_policy() -> RetryPolicy {
    RetryPolicy::transient(RETRY_STATUSES.iter().copied())
}
