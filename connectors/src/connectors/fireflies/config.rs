use crate::config::SourceConfig;
use anyhow::{bail, Result};
use sluice::{Granularity, RetryPolicy};

pub const GRAPHQL_URL: &str = "https://api.fireflies.ai/graphql";

/// The API caps `limit` at 50; smaller pages keep transcript payloads sane.
pub const PAGE_SIZE: usize = 10;

/// Default analytics window, in days.
pub const ANALYTICS_CHUNK_DAYS: u32 = 30;

/// Fireflies access settings.
///
/// Options: `api_key` (or `FIREFLIES_API_KEY`) and `granularity` for the
/// analytics resource: `hour`, `day`, `month`, or a number of days
/// (default 30).
#[derive(Debug, Clone)]
pub struct FirefliesConfig {
    pub api_key: String,
    pub granularity: Granularity,
}

impl FirefliesConfig {
    pub fn from_source(source: &SourceConfig) -> Result<Self> {
        let granularity = match (source.option_str("granularity"), source.option_int("granularity")) {
            (Some(name), _) => parse_granularity(&name)?,
            (None, Some(days)) => parse_granularity(&days.to_string())?,
            (None, None) => Granularity::FixedDays(ANALYTICS_CHUNK_DAYS),
        };
        Ok(Self {
            api_key: source.api_key()?,
            granularity,
        })
    }
}

/// `hour`, `day`, `month` or a positive number of days.
pub fn parse_granularity(value: &str) -> Result<Granularity> {
    match value.trim().to_ascii_lowercase().as_str() {
        "hour" => Ok(Granularity::Hour),
        "day" => Ok(Granularity::Day),
        "month" => Ok(Granularity::MonthAligned),
        other => match other.parse::<u32>() {
            Ok(days) if days > 0 => Ok(Granularity::FixedDays(days)),
            _ => bail!(
                "invalid Fireflies granularity `{}`, expected hour, day, month or a number of days",
                value
            ),
        },
    }
}

/// Rate limits are the only transient failure; they can last a while.
pub fn retry_policy() -> RetryPolicy {
    RetryPolicy::transient([429]).with_max_attempts(12)
}
