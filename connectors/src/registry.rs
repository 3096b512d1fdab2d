//! Connector registry - maps a source's `connector` name to an adapter.

use crate::config::SourceConfig;
use crate::connectors::fireflies::{config::FirefliesConfig, FirefliesConnector};
use crate::connectors::hostaway::{config::HostawayConfig, HostawayConnector};
use crate::connectors::intercom::{config::IntercomConfig, IntercomConnector};
use crate::connectors::monday::{config::MondayConfig, MondayConnector};
use crate::connectors::stripe::{config::StripeConfig, StripeConnector};
use crate::connectors::{fireflies, hostaway, intercom, monday, stripe};
use crate::Connector;
use anyhow::{bail, Result};
use std::sync::Arc;

/// Names accepted in `connector = "..."`.
pub const CONNECTORS: &[&str] = &["fireflies", "hostaway", "intercom", "monday", "stripe"];

pub fn available_connectors() -> &'static [&'static str] {
    CONNECTORS
}

/// Builds the adapter for `source`.
///
/// The source's `[fetch.retry]` table, when present, replaces the
/// provider's default retry policy.
pub fn build_connector(source: &SourceConfig) -> Result<Arc<dyn Connector>> {
    let connector: Arc<dyn Connector> = match source.connector.as_str() {
        "fireflies" => {
            let policy = source.fetch.retry_policy(fireflies::config::retry_policy());
            Arc::new(FirefliesConnector::new(&FirefliesConfig::from_source(source)?, policy)?)
        }
        "hostaway" => {
            let policy = source.fetch.retry_policy(hostaway::config::retry_policy());
            Arc::new(HostawayConnector::new(&HostawayConfig::from_source(source)?, policy)?)
        }
        "intercom" => {
            let policy = source.fetch.retry_policy(intercom::config::retry_policy());
            Arc::new(IntercomConnector::new(&IntercomConfig::from_source(source)?, policy)?)
        }
        "monday" => {
            let policy = source.fetch.retry_policy(monday::config::retry_policy());
            Arc::new(MondayConnector::new(&MondayConfig::from_source(source)?, policy)?)
        }
        "stripe" => {
            let policy = source.fetch.retry_policy(stripe::config::retry_policy());
            Arc::new(StripeConnector::new(&StripeConfig::from_source(source)?, policy)?)
        }
        other => bail!(
            "unknown connector `{}` for source `{}` (available: {})",
            other,
            source.name,
            CONNECTORS.join(", ")
        ),
    };
    Ok(connector)
}
