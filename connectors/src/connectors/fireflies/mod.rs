pub mod config;
pub mod queries;

use crate::types::{ColumnHint, FetchPlan, ResourceSpec, SyncWindow};
use crate::Connector;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration, SecondsFormat};
use sluice::chunk::chunks;
use sluice::{
    ChunkPlan, Granularity, PageFetcher, PageRequest, Pagination, RequestBody, ResponseShape,
    RetryClient, RetryPolicy,
};

use self::config::{FirefliesConfig, ANALYTICS_CHUNK_DAYS, GRAPHQL_URL, PAGE_SIZE};

/// Fireflies.ai connector (GraphQL).
///
/// Transcripts and bites page with `limit`/`skip`. Analytics are queried
/// one time window at a time; every other resource is a single query.
pub struct FirefliesConnector {
    client: RetryClient,
    url: String,
    api_key: String,
    granularity: Granularity,
}

impl FirefliesConnector {
    pub fn new(config: &FirefliesConfig, policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: RetryClient::new(policy)?,
            url: GRAPHQL_URL.to_string(),
            api_key: config.api_key.clone(),
            granularity: config.granularity,
        })
    }

    /// Create a connector against a custom GraphQL endpoint (for testing).
    pub fn with_base_url(url: String, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: RetryClient::new(config::retry_policy())?,
            url,
            api_key: api_key.to_string(),
            granularity: Granularity::FixedDays(ANALYTICS_CHUNK_DAYS),
        })
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    fn query(&self, document: &str, items: &str) -> PageFetcher {
        PageFetcher::new(self.client.clone(), self.url.clone())
            .bearer_auth(self.api_key.clone())
            .body(RequestBody::graphql(document))
            .shape(ResponseShape::path(format!("data.{}", items)))
    }

    fn single(&self, document: &str, items: &str) -> FetchPlan {
        FetchPlan::new(self.query(document, items), PageRequest::new(""))
    }

    fn paged(&self, document: &str, items: &str) -> FetchPlan {
        let fetcher = self
            .query(document, items)
            .pagination(Pagination::offset("skip", PAGE_SIZE).with_size_param("limit", PAGE_SIZE));
        FetchPlan::new(fetcher, PageRequest::new(""))
    }

    /// One analytics query per time chunk of the window. Each record is
    /// tagged with its chunk's `start_time`/`end_time`; the latter is the
    /// watermark.
    fn analytics(&self, window: &SyncWindow) -> FetchPlan {
        let until = window.until();
        let since = window
            .since()
            .unwrap_or_else(|| until - Duration::days(i64::from(ANALYTICS_CHUNK_DAYS)));

        // The API treats endTime as inclusive: ask up to the last second
        // before the next chunk starts.
        let plan = ChunkPlan::new(chunks(since, until, self.granularity), |chunk| {
            let last_second = chunk.resume_at() - Duration::seconds(1);
            PageRequest::new("")
                .param("startTime", chunk.start.to_rfc3339_opts(SecondsFormat::Secs, true))
                .param("endTime", last_second.to_rfc3339_opts(SecondsFormat::Secs, true))
        })
        .annotate("start_time", "end_time");

        FetchPlan::new(self.query(queries::ANALYTICS, "analytics"), PageRequest::new(""))
            .chunks(plan)
            .cursor(window.timestamp_cursor("end_time").end_inclusive(true))
    }
}

#[async_trait]
impl Connector for FirefliesConnector {
    fn name(&self) -> &str {
        "fireflies"
    }

    fn resources(&self) -> Vec<ResourceSpec> {
        vec![
            ResourceSpec::new("active_meetings", &["id"]),
            ResourceSpec::new("analytics", &["start_time", "end_time"])
                .incremental("end_time")
                .column("start_time", ColumnHint::Timestamp)
                .column("end_time", ColumnHint::Timestamp)
                .column("team", ColumnHint::Json)
                .column("users", ColumnHint::Json),
            ResourceSpec::new("channels", &["id"]),
            ResourceSpec::new("users", &["user_id"]),
            ResourceSpec::new("user_groups", &["id"]),
            ResourceSpec::new("contacts", &["email"]),
            ResourceSpec::new("bites", &["id"]),
            ResourceSpec::new("transcripts", &["id"])
                .column("sentences", ColumnHint::Json)
                .column("summary", ColumnHint::Json),
        ]
    }

    async fn plan(&self, resource: &str, window: &SyncWindow) -> Result<FetchPlan> {
        let plan = match resource {
            "active_meetings" => self.single(queries::ACTIVE_MEETINGS, "active_meetings"),
            "analytics" => self.analytics(window),
            "channels" => self.single(queries::CHANNELS, "channels"),
            "users" => self.single(queries::USERS, "users"),
            "user_groups" => self.single(queries::USER_GROUPS, "user_groups"),
            "contacts" => self.single(queries::CONTACTS, "contacts"),
            "bites" => {
                let mut plan = self.paged(queries::BITES, "bites");
                plan.initial.set_param("my_team", true);
                plan
            }
            "transcripts" => self.paged(queries::TRANSCRIPTS, "transcripts"),
            other => bail!("unknown Fireflies resource `{}`", other),
        };
        Ok(plan)
    }
}
