//! Source configuration file.
//!
//! ```toml
//! state_db = "sluice.db"
//! poll_interval_secs = 3600
//!
//! [[sources]]
//! name = "support"
//! connector = "intercom"
//! resources = ["contacts", "tickets"]
//! start_date = "2024-01-01"
//!
//! [sources.options]
//! region = "eu"
//!
//! [sources.fetch]
//! page_delay_ms = 250
//! ```
//!
//! Tokens come from `options.api_key` or the `<CONNECTOR>_API_KEY`
//! environment variable.

use crate::types::SyncWindow;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sluice::config::FetchSettings;
use std::collections::HashSet;
use std::path::Path;

fn default_state_db() -> String {
    "sluice.db".to_string()
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SluiceConfig {
    /// SQLite file holding watermarks
    #[serde(default = "default_state_db")]
    pub state_db: String,

    /// Seconds between runs; 0 runs once and exits
    #[serde(default)]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for SluiceConfig {
    fn default() -> Self {
        Self {
            state_db: default_state_db(),
            poll_interval_secs: 0,
            sources: Vec::new(),
        }
    }
}

/// One configured source: a connector instance and its resource selection.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Unique name, also the key of persisted watermarks
    pub name: String,

    /// Connector identifier, e.g. "stripe"
    pub connector: String,

    /// Resources to extract; all declared resources when absent
    #[serde(default)]
    pub resources: Option<Vec<String>>,

    /// `YYYY-MM-DD` or RFC 3339
    #[serde(default)]
    pub start_date: Option<String>,

    #[serde(default)]
    pub end_date: Option<String>,

    /// Connector-specific settings
    #[serde(default)]
    pub options: toml::Table,

    #[serde(default)]
    pub fetch: FetchSettings,
}

impl SluiceConfig {
    /// Reads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SluiceConfig = toml::from_str(text).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `SLUICE_STATE_DB` and `SLUICE_POLL_INTERVAL_SECS`.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SLUICE_STATE_DB") {
            self.state_db = path;
        }
        if let Ok(secs) = std::env::var("SLUICE_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = secs
                .parse()
                .context("SLUICE_POLL_INTERVAL_SECS must be a whole number of seconds")?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                bail!("duplicate source name `{}`", source.name);
            }
            source
                .window()
                .with_context(|| format!("source `{}`", source.name))?;
        }
        Ok(())
    }
}

impl SourceConfig {
    /// Configured date range, without a persisted watermark.
    pub fn window(&self) -> Result<SyncWindow> {
        let start = self.start_date.as_deref().map(parse_date).transpose()?;
        let end = self.end_date.as_deref().map(parse_date).transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                bail!("start_date {} is after end_date {}", start, end);
            }
        }
        Ok(SyncWindow::new(start, end))
    }

    /// String option, if set.
    pub fn option_str(&self, key: &str) -> Option<String> {
        self.options
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// Integer option, if set.
    pub fn option_int(&self, key: &str) -> Option<i64> {
        self.options.get(key).and_then(|v| v.as_integer())
    }

    /// API token from `options.api_key`, falling back to `<CONNECTOR>_API_KEY`.
    pub fn api_key(&self) -> Result<String> {
        if let Some(key) = self.option_str("api_key") {
            return Ok(key);
        }
        let var = format!("{}_API_KEY", self.connector.to_uppercase());
        std::env::var(&var).with_context(|| {
            format!("source `{}` has no options.api_key and {} is not set", self.name, var)
        })
    }
}

/// Parses `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("`{}` is neither YYYY-MM-DD nor RFC 3339", value))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}
