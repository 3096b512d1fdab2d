pub mod config;

use crate::types::{ColumnHint, FetchPlan, ResourceSpec, SyncWindow};
use crate::Connector;
use anyhow::{bail, Result};
use async_trait::async_trait;
use sluice::chunk::chunks;
use sluice::{
    ChunkPlan, Granularity, PageFetcher, PageRequest, Pagination, ResponseShape, RetryClient,
    RetryPolicy, TokenSource,
};

use self::config::{StripeConfig, BASE_URL, PAGE_SIZE};

/// Resources listed by `created`, filtered with `created[gte]`/`created[lt]`.
const INCREMENTAL: &[&str] = &[
    "balance_transactions",
    "charges",
    "customers",
    "events",
    "invoices",
    "payment_intents",
    "payouts",
    "refunds",
    "subscriptions",
];

/// Small catalogues, always fully reloaded.
const FULL: &[&str] = &["prices", "products"];

/// Stripe connector.
///
/// Every list endpoint pages with `starting_after=<last id>` while
/// `has_more` is true. Lists come newest first, so the watermark is only
/// known once the whole range has been read.
///
/// With a known start, an incremental range can be read as `chunks` equal
/// windows, one after the other.
pub struct StripeConnector {
    client: RetryClient,
    base_url: String,
    api_key: String,
    chunks: u32,
}

impl StripeConnector {
    pub fn new(config: &StripeConfig, policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: RetryClient::new(policy)?,
            base_url: BASE_URL.to_string(),
            api_key: config.api_key.clone(),
            chunks: config.chunks,
        })
    }

    /// Create a connector with a custom API base URL (for testing).
    pub fn with_base_url(base_url: String, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: RetryClient::new(config::retry_policy())?,
            base_url,
            api_key: api_key.to_string(),
            chunks: 1,
        })
    }

    pub fn with_chunks(mut self, chunks: u32) -> Self {
        self.chunks = chunks.max(1);
        self
    }

    fn fetcher(&self) -> PageFetcher {
        PageFetcher::new(self.client.clone(), self.base_url.clone())
            .bearer_auth(self.api_key.clone())
            .pagination(
                Pagination::cursor("starting_after", TokenSource::last_item("id", "has_more"))
                    .with_size_param("limit", PAGE_SIZE),
            )
            .shape(ResponseShape::path("data"))
    }
}

#[async_trait]
impl Connector for StripeConnector {
    fn name(&self) -> &str {
        "stripe"
    }

    fn resources(&self) -> Vec<ResourceSpec> {
        let incremental = INCREMENTAL.iter().map(|name| {
            ResourceSpec::new(name, &["id"])
                .incremental("created")
                .column("created", ColumnHint::BigInt)
                .column("metadata", ColumnHint::Json)
        });
        let full = FULL
            .iter()
            .map(|name| ResourceSpec::new(name, &["id"]).column("metadata", ColumnHint::Json));
        incremental.chain(full).collect()
    }

    async fn plan(&self, resource: &str, window: &SyncWindow) -> Result<FetchPlan> {
        let endpoint = format!("/{}", resource);

        if FULL.contains(&resource) {
            return Ok(FetchPlan::new(self.fetcher(), PageRequest::new(endpoint)));
        }
        if !INCREMENTAL.contains(&resource) {
            bail!("unknown Stripe resource `{}`", resource);
        }

        // Canceled subscriptions are hidden unless asked for.
        let all_statuses = resource == "subscriptions";
        let cursor = window.unix_cursor("created").sorted(false);

        let Some(since) = window.since() else {
            let mut request = PageRequest::new(endpoint);
            if let Some(end) = window.end {
                request.set_param("created[lt]", end.timestamp());
            }
            if all_statuses {
                request.set_param("status", "all");
            }
            return Ok(FetchPlan::new(self.fetcher(), request).cursor(cursor));
        };

        let windows = chunks(since, window.until(), Granularity::Parts(self.chunks));
        let plan = ChunkPlan::new(windows, move |chunk| {
            let mut request = PageRequest::new(endpoint.clone())
                .param("created[gte]", chunk.start.timestamp())
                .param("created[lt]", chunk.end.timestamp());
            if all_statuses {
                request.set_param("status", "all");
            }
            request
        });
        Ok(FetchPlan::new(self.fetcher(), PageRequest::default())
            .chunks(plan)
            .cursor(cursor))
    }
}
