pub mod config;
pub mod transformer;

use crate::types::{ColumnHint, FetchPlan, ResourceSpec, SyncWindow};
use crate::Connector;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use sluice::{
    PageFetcher, PageRequest, Pagination, RequestBody, ResponseShape, RetryClient, RetryPolicy,
    TokenSource,
};

use self::config::{IntercomConfig, API_VERSION, PAGE_SIZE};
use self::transformer::{transform_company, transform_contact, transform_conversation};

/// Intercom connector: contacts and conversations through the search API,
/// companies through the scroll API, tickets and articles through cursor
/// pagination, and a handful of single-page reference lists.
pub struct IntercomConnector {
    client: RetryClient,
    base_url: String,
    access_token: String,
}

impl IntercomConnector {
    pub fn new(config: &IntercomConfig, policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: RetryClient::new(policy)?,
            base_url: config.base_url().to_string(),
            access_token: config.access_token.clone(),
        })
    }

    /// Create a connector with a custom API base URL (for testing).
    pub fn with_base_url(base_url: String, access_token: &str) -> Result<Self> {
        Ok(Self {
            client: RetryClient::new(config::retry_policy())?,
            base_url,
            access_token: access_token.to_string(),
        })
    }

    fn fetcher(&self) -> PageFetcher {
        PageFetcher::new(self.client.clone(), self.base_url.clone())
            .bearer_auth(self.access_token.clone())
            .header("Accept", "application/json")
            .header("Intercom-Version", API_VERSION)
    }

    /// POST `/<resource>/search` filtered on `updated_at`, paging through
    /// `pagination.starting_after` in the JSON body.
    fn search(&self, resource: &str, items: &str, window: &SyncWindow) -> FetchPlan {
        let since = window.since().map_or(0, |t| t.timestamp());
        let query = search_query("updated_at", since, window.end.map(|t| t.timestamp()));
        let fetcher = self
            .fetcher()
            .body(RequestBody::Json(json!({
                "query": query,
                "sort": {"field": "updated_at", "order": "ascending"}
            })))
            .pagination(
                Pagination::cursor(
                    "pagination.starting_after",
                    TokenSource::body("pages.next.starting_after"),
                )
                .with_size_param("pagination.per_page", PAGE_SIZE),
            )
            .shape(ResponseShape::path(items));
        FetchPlan::new(fetcher, PageRequest::new(format!("/{}/search", resource)))
            .cursor(window.unix_cursor("updated_at"))
    }

    fn cursor_list(&self, endpoint: &str, items: &str) -> (PageFetcher, PageRequest) {
        let fetcher = self
            .fetcher()
            .pagination(
                Pagination::cursor("starting_after", TokenSource::body("pages.next.starting_after"))
                    .with_size_param("per_page", PAGE_SIZE),
            )
            .shape(ResponseShape::path(items));
        (fetcher, PageRequest::new(endpoint))
    }

    fn single(&self, endpoint: &str, items: &str) -> FetchPlan {
        let fetcher = self.fetcher().shape(ResponseShape::path(items));
        FetchPlan::new(fetcher, PageRequest::new(endpoint))
    }
}

#[async_trait]
impl Connector for IntercomConnector {
    fn name(&self) -> &str {
        "intercom"
    }

    fn resources(&self) -> Vec<ResourceSpec> {
        vec![
            ResourceSpec::new("contacts", &["id"])
                .incremental("updated_at")
                .column("custom_attributes", ColumnHint::Json)
                .column("created_at", ColumnHint::BigInt)
                .column("updated_at", ColumnHint::BigInt),
            ResourceSpec::new("conversations", &["id"])
                .incremental("updated_at")
                .column("created_at", ColumnHint::BigInt)
                .column("updated_at", ColumnHint::BigInt),
            ResourceSpec::new("companies", &["id"])
                .incremental("updated_at")
                .column("custom_attributes", ColumnHint::Json),
            ResourceSpec::new("tickets", &["id"]).incremental("updated_at"),
            ResourceSpec::new("articles", &["id"]).incremental("updated_at"),
            ResourceSpec::new("admins", &["id"]),
            ResourceSpec::new("teams", &["id"]),
            ResourceSpec::new("tags", &["id"]),
            ResourceSpec::new("segments", &["id"]),
            ResourceSpec::new("data_attributes", &["name", "model"]),
        ]
    }

    async fn plan(&self, resource: &str, window: &SyncWindow) -> Result<FetchPlan> {
        let plan = match resource {
            "contacts" => self
                .search("contacts", "data", window)
                .normalize(transform_contact),
            "conversations" => self
                .search("conversations", "conversations", window)
                .normalize(transform_conversation),
            "companies" => {
                // The scroll API ignores filters; records arrive in no particular order.
                let fetcher = self
                    .fetcher()
                    .pagination(Pagination::scroll(
                        "/companies/scroll",
                        "scroll_param",
                        "scroll_param",
                    ))
                    .shape(ResponseShape::path("data"));
                FetchPlan::new(fetcher, PageRequest::new("/companies/scroll"))
                    .cursor(window.unix_cursor("updated_at").sorted(false))
                    .normalize(transform_company)
            }
            "tickets" => {
                let (fetcher, request) = self.cursor_list("/tickets", "tickets");
                let since = window.since().map_or(0, |t| t.timestamp());
                FetchPlan::new(fetcher, request.param("updated_since", since))
                    .cursor(window.unix_cursor("updated_at").end_inclusive(true))
            }
            "articles" => {
                let (fetcher, request) = self.cursor_list("/articles", "data");
                FetchPlan::new(fetcher, request)
                    .cursor(window.unix_cursor("updated_at").sorted(false))
            }
            "admins" => self.single("/admins", "admins"),
            "teams" => self.single("/teams", "teams"),
            "tags" => self.single("/tags", "data"),
            "segments" => self.single("/segments", "segments"),
            "data_attributes" => self.single("/data_attributes", "data"),
            other => bail!("unknown Intercom resource `{}`", other),
        };
        Ok(plan)
    }
}

/// Search filter on `field`: `> start`, and `< end` when an end is given.
fn search_query(field: &str, start: i64, end: Option<i64>) -> Value {
    let lower = json!({"field": field, "operator": ">", "value": start});
    match end {
        None => lower,
        Some(end) => json!({
            "operator": "AND",
            "value": [lower, {"field": field, "operator": "<", "value": end}]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::test_support::collect;
    use chrono::{TimeZone, Utc};
    use mockito::{Matcher, Server};
    use sluice::CursorValue;

    fn window(start: i64, end: Option<i64>) -> SyncWindow {
        SyncWindow::new(
            Utc.timestamp_opt(start, 0).single(),
            end.and_then(|e| Utc.timestamp_opt(e, 0).single()),
        )
    }

    #[test]
    fn test_connector_metadata() {
        let connector = IntercomConnector::with_base_url("http://localhost".into(), "tok").unwrap();
        assert_eq!(connector.name(), "intercom");

        let resources = connector.resources();
        assert_eq!(resources.len(), 10);
        assert!(connector.resource("contacts").unwrap().is_incremental());
        assert!(!connector.resource("admins").unwrap().is_incremental());
        assert_eq!(
            connector.resource("data_attributes").unwrap().primary_key,
            vec!["name", "model"]
        );
    }

    #[test]
    fn test_search_query() {
        assert_eq!(
            search_query("updated_at", 100, None),
            json!({"field": "updated_at", "operator": ">", "value": 100})
        );
        let ranged = search_query("updated_at", 100, Some(200));
        assert_eq!(ranged["operator"], "AND");
        assert_eq!(ranged["value"][1]["operator"], "<");
        assert_eq!(ranged["value"][1]["value"], 200);
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let connector = IntercomConnector::with_base_url("http://localhost".into(), "tok").unwrap();
        let err = connector.plan("invoices", &SyncWindow::default()).await.err().unwrap();
        assert!(err.to_string().contains("invoices"));
    }

    #[tokio::test]
    async fn test_contacts_search_pages_through_body_cursor() {
        let mut server = Server::new_async().await;

        let first = server
            .mock("POST", "/contacts/search")
            .match_header("authorization", "Bearer tok")
            .match_header("intercom-version", API_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "query": {"field": "updated_at", "operator": ">", "value": 1000},
                "sort": {"field": "updated_at", "order": "ascending"},
                "pagination": {"per_page": 150}
            })))
            .with_status(200)
            .with_body(
                r#"{"type": "list", "data": [
                    {"id": "c1", "updated_at": 1100, "location": {"country": "NL", "city": "Delft"}}
                ], "pages": {"next": {"starting_after": "WzE"}}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let second = server
            .mock("POST", "/contacts/search")
            .match_body(Matcher::PartialJson(json!({
                "sort": {"field": "updated_at", "order": "ascending"},
                "pagination": {"per_page": 150, "starting_after": "WzE"}
            })))
            .with_status(200)
            .with_body(
                r#"{"type": "list", "data": [{"id": "c2", "updated_at": 1200}], "pages": {}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let connector = IntercomConnector::with_base_url(server.url(), "tok").unwrap();
        let plan = connector.plan("contacts", &window(1000, None)).await.unwrap();
        let (records, cursor) = collect(plan).await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["location_country"], "NL");
        assert_eq!(records[0]["custom_attributes"], json!({}));
        assert_eq!(cursor, Some(CursorValue::Integer(1200)));
    }

    #[tokio::test]
    async fn test_companies_scroll_filters_without_stopping() {
        let mut server = Server::new_async().await;

        let _first = server
            .mock("GET", "/companies/scroll")
            .with_status(200)
            .with_body(
                r#"{"data": [
                    {"id": "a", "updated_at": 5000, "plan": {"id": "p", "name": "Pro"}},
                    {"id": "b", "updated_at": 1500}
                ], "scroll_param": "s-1"}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let _second = server
            .mock("GET", "/companies/scroll")
            .match_query(Matcher::UrlEncoded("scroll_param".into(), "s-1".into()))
            .with_status(200)
            .with_body(r#"{"data": [{"id": "c", "updated_at": 1800}], "scroll_param": "s-2"}"#)
            .expect(1)
            .create_async()
            .await;

        let _third = server
            .mock("GET", "/companies/scroll")
            .match_query(Matcher::UrlEncoded("scroll_param".into(), "s-2".into()))
            .with_status(200)
            .with_body(r#"{"data": [], "scroll_param": null}"#)
            .expect(1)
            .create_async()
            .await;

        let connector = IntercomConnector::with_base_url(server.url(), "tok").unwrap();
        let plan = connector
            .plan("companies", &window(1000, Some(2000)))
            .await
            .unwrap();
        let (records, cursor) = collect(plan).await.unwrap();

        let ids: Vec<_> = records.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("b"), json!("c")]);
        assert_eq!(cursor, Some(CursorValue::Integer(1800)));
    }

    #[tokio::test]
    async fn test_tickets_stop_past_end() {
        let mut server = Server::new_async().await;

        let _page = server
            .mock("GET", "/tickets")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("updated_since".into(), "1000".into()),
                Matcher::UrlEncoded("per_page".into(), "150".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"tickets": [
                    {"id": "t1", "updated_at": 1500},
                    {"id": "t2", "updated_at": 2000},
                    {"id": "t3", "updated_at": 2500}
                ], "pages": {"next": {"starting_after": "more"}}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let connector = IntercomConnector::with_base_url(server.url(), "tok").unwrap();
        let plan = connector
            .plan("tickets", &window(1000, Some(2000)))
            .await
            .unwrap();
        let (records, cursor) = collect(plan).await.unwrap();

        // end is inclusive for tickets; t3 ends the session before page two
        assert_eq!(records.len(), 2);
        assert_eq!(cursor, Some(CursorValue::Integer(2000)));
    }

    #[tokio::test]
    async fn test_admins_single_page() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/admins")
            .with_status(200)
            .with_body(r#"{"type": "admin.list", "admins": [{"id": "1"}, {"id": "2"}]}"#)
            .create_async()
            .await;

        let connector = IntercomConnector::with_base_url(server.url(), "tok").unwrap();
        let plan = connector.plan("admins", &SyncWindow::default()).await.unwrap();
        let (records, cursor) = collect(plan).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(cursor, None);
    }
}
