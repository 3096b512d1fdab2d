pub mod config;
pub mod queries;

use crate::types::{FetchPlan, ResourceSpec, SyncWindow};
use crate::Connector;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use sluice::normalize::flatten;
use sluice::{
    Auth, PageFetcher, PageRequest, Pagination, RequestBody, ResponseShape,
    RetryClient, RetryPolicy,
};
use std::collections::BTreeSet;
use tracing::debug;

use self::config::{MondayConfig, GRAPHQL_URL, PAGE_SIZE};

/// monday.com connector (GraphQL).
///
/// Users and boards page with `page`/`limit`; the rest are single queries.
/// Nested objects are flattened one level, so `creator { id }` arrives as
/// `creator_id`.
pub struct MondayConnector {
    client: RetryClient,
    url: String,
    api_token: String,
}

impl MondayConnector {
    pub fn new(config: &MondayConfig, policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: RetryClient::new(policy)?,
            url: GRAPHQL_URL.to_string(),
            api_token: config.api_token.clone(),
        })
    }

    /// Create a connector against a custom GraphQL endpoint (for testing).
    pub fn with_base_url(url: String, api_token: &str) -> Result<Self> {
        Ok(Self {
            client: RetryClient::new(config::retry_policy())?,
            url,
            api_token: api_token.to_string(),
        })
    }

    fn query(&self, document: &str, items: &str) -> PageFetcher {
        // The token goes in as is, without a scheme.
        PageFetcher::new(self.client.clone(), self.url.clone())
            .auth(Auth::Header {
                name: "Authorization".to_string(),
                value: self.api_token.clone(),
            })
            .body(RequestBody::graphql(document))
            .shape(ResponseShape::path(format!("data.{}", items)))
    }

    fn single(&self, document: &str, items: &str) -> FetchPlan {
        FetchPlan::new(self.query(document, items), PageRequest::new("")).normalize(flatten)
    }

    fn paged(&self, document: &str, items: &str) -> FetchPlan {
        let fetcher = self
            .query(document, items)
            .pagination(Pagination::page_number("page", PAGE_SIZE).with_size_param("limit", PAGE_SIZE));
        FetchPlan::new(fetcher, PageRequest::new("")).normalize(flatten)
    }

    fn updates(&self, window: &SyncWindow) -> FetchPlan {
        let mut plan = self.single(queries::UPDATES, "updates");
        plan.initial.set_param("limit", PAGE_SIZE as u64);
        if let Some(since) = window.since() {
            plan.initial
                .set_param("from_date", since.format("%Y-%m-%d").to_string());
        }
        if let Some(end) = window.end {
            plan.initial.set_param("to_date", end.format("%Y-%m-%d").to_string());
        }
        plan
    }

    /// Workspaces cannot be listed directly: their ids are collected from
    /// the boards first.
    fn workspaces(&self) -> FetchPlan {
        let fetcher = self.query(queries::WORKSPACES, "workspaces");
        let boards = self.paged(queries::BOARDS, "boards");
        boards.then(move |boards| {
            let mut ids = BTreeSet::new();
            for board in &boards {
                match board.get("workspace_id") {
                    Some(Value::String(id)) => {
                        ids.insert(id.clone());
                    }
                    Some(Value::Number(id)) => {
                        ids.insert(id.to_string());
                    }
                    _ => {}
                }
            }
            debug!(workspaces = ids.len(), "Collected workspace ids from boards");

            if ids.is_empty() {
                return Ok(FetchPlan::empty(fetcher));
            }
            let ids: Vec<String> = ids.into_iter().collect();
            Ok(FetchPlan::new(fetcher, PageRequest::new("").param("ids", ids)).normalize(flatten))
        })
    }
}
#[async_trait]
impl Connector for MondayConnector {
    fn name(&self) -> &str {
        "monday"
    }

    fn resources(&self) -> Vec<ResourceSpec> {
        vec![
            ResourceSpec::new("account", &["id"]),
            ResourceSpec::new("account_roles", &["id"]),
            ResourceSpec::new("boards", &["id"]),
            ResourceSpec::new("custom_activities", &["id"]),
            ResourceSpec::new("tags", &["id"]),
            ResourceSpec::new("teams", &["id"]),
            ResourceSpec::new("updates", &["id"]),
            ResourceSpec::new("users", &["id"]),
            ResourceSpec::new("workspaces", &["id"]),
        ]
    }

    async fn plan(&self, resource: &str, window: &SyncWindow) -> Result<FetchPlan> {
        let plan = match resource {
            "account" => self.single(queries::ACCOUNT, "account"),
            "account_roles" => self.single(queries::ACCOUNT_ROLES, "account_roles"),
            "boards" => self.paged(queries::BOARDS, "boards"),
            "custom_activities" => self.single(queries::CUSTOM_ACTIVITIES, "custom_activity"),
            "tags" => self.single(queries::TAGS, "tags"),
            "teams" => self.single(queries::TEAMS, "teams"),
            "updates" => self.updates(window),
            "users" => self.paged(queries::USERS, "users"),
            "workspaces" => self.workspaces(),
            other => bail!("unknown monday.com resource `{}`", other),
        };
        Ok(plan)
    }
}
