use anyhow::{bail, Result};
use async_trait::async_trait;
use mockito::{Matcher, Server};
use sluice::{
    CursorValue, FetchOutcome, PageFetcher, PageRequest, Pagination, ResponseShape, RetryClient,
    RetryPolicy,
};
use sluice_connectors::{
    Connector, FetchPlan, Message, ResourceSpec, Runner, SluiceConfig, SourceConfig, StateStore,
    SyncWindow,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Connector over a mock server: `events` is incremental on `updated_at`,
/// `tags` is fully reloaded and `broken` always fails. `shuffled` is
/// incremental too but its pages come in no particular order.
struct FakeConnector {
    client: RetryClient,
    base_url: String,
}

impl FakeConnector {
    fn new(base_url: String) -> Arc<dyn Connector> {
        let policy = RetryPolicy::transient([503]).with_max_attempts(1);
        Arc::new(Self {
            client: RetryClient::new(policy).unwrap(),
            base_url,
        })
    }

    fn fetcher(&self) -> PageFetcher {
        PageFetcher::new(self.client.clone(), self.base_url.clone())
            .shape(ResponseShape::path("data"))
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn name(&self) -> &str {
        "fake"
    }

    fn resources(&self) -> Vec<ResourceSpec> {
        vec![
            ResourceSpec::new("broken", &["id"]).incremental("updated_at"),
            ResourceSpec::new("events", &["id"]).incremental("updated_at"),
            ResourceSpec::new("shuffled", &["id"]).incremental("updated_at"),
            ResourceSpec::new("tags", &["id"]),
        ]
    }

    async fn plan(&self, resource: &str, window: &SyncWindow) -> Result<FetchPlan> {
        let since = window.since().map_or(0, |t| t.timestamp());
        match resource {
            "events" | "broken" => Ok(FetchPlan::new(
                self.fetcher(),
                PageRequest::new(format!("/{}", resource)).param("since", since),
            )
            .cursor(window.unix_cursor("updated_at"))),
            "shuffled" => Ok(FetchPlan::new(
                self.fetcher().pagination(Pagination::page_number("page", 2)),
                PageRequest::new("/shuffled").param("since", since),
            )
            .cursor(window.unix_cursor("updated_at").sorted(false))),
            "tags" => Ok(FetchPlan::new(self.fetcher(), PageRequest::new("/tags"))),
            other => bail!("unknown resource {}", other),
        }
    }
}

fn source(resources: &[&str]) -> SourceConfig {
    let list: Vec<String> = resources.iter().map(|r| format!("\"{}\"", r)).collect();
    let text = format!(
        "[[sources]]\nname = \"src\"\nconnector = \"fake\"\nresources = [{}]",
        list.join(", ")
    );
    SluiceConfig::from_toml_str(&text).unwrap().sources.remove(0)
}

fn store(dir: &TempDir) -> Arc<StateStore> {
    let path = dir.path().join("state.db");
    Arc::new(StateStore::new(path.to_str().unwrap()).unwrap())
}

fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

#[tokio::test]
async fn test_watermark_persists_between_runs() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let state = store(&dir);

    let first = server
        .mock("GET", "/events")
        .match_query(Matcher::UrlEncoded("since".into(), "0".into()))
        .with_status(200)
        .with_body(r#"{"data": [{"id": 1, "updated_at": 100}, {"id": 2, "updated_at": 200}]}"#)
        .expect(1)
        .create_async()
        .await;

    let second = server
        .mock("GET", "/events")
        .match_query(Matcher::UrlEncoded("since".into(), "200".into()))
        .with_status(200)
        .with_body(r#"{"data": [{"id": 2, "updated_at": 200}, {"id": 3, "updated_at": 300}]}"#)
        .expect(1)
        .create_async()
        .await;

    let (tx, mut rx) = mpsc::channel(64);
    let runner = Runner::new(Arc::clone(&state), tx);
    let connector = FakeConnector::new(server.url());

    let summary = runner.run_source(&source(&["events"]), Arc::clone(&connector)).await.unwrap();
    let report = summary.report("events").unwrap();
    assert_eq!(report.records, 2);
    assert_eq!(report.outcome, FetchOutcome::Exhausted);
    assert_eq!(state.get("src", "events").unwrap(), Some(CursorValue::Integer(200)));

    let summary = runner.run_source(&source(&["events"]), connector).await.unwrap();
    assert_eq!(summary.report("events").unwrap().records, 2);
    assert_eq!(
        summary.report("events").unwrap().watermark,
        Some(CursorValue::Integer(300))
    );
    assert_eq!(state.get("src", "events").unwrap(), Some(CursorValue::Integer(300)));

    first.assert_async().await;
    second.assert_async().await;

    let status = runner.status();
    let status = status.lock().await;
    assert_eq!(status["src.events"].run_count, 2);
    drop(status);
    drop(runner);
    assert_eq!(drain(&mut rx).len(), 2 * (1 + 2 + 1));
}

#[tokio::test]
async fn test_failed_resource_keeps_watermark() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let state = store(&dir);
    let run_id = uuid::Uuid::now_v7();
    state.set("src", "broken", &CursorValue::Integer(50), &run_id).unwrap();

    let _broken = server
        .mock("GET", "/broken")
        .match_query(Matcher::UrlEncoded("since".into(), "50".into()))
        .with_status(400)
        .with_body(r#"{"error": "bad request"}"#)
        .create_async()
        .await;

    let _events = server
        .mock("GET", "/events")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"data": [{"id": 1, "updated_at": 10}]}"#)
        .create_async()
        .await;

    let (tx, mut rx) = mpsc::channel(64);
    let runner = Runner::new(Arc::clone(&state), tx);
    let summary = runner
        .run_source(&source(&["broken", "events"]), FakeConnector::new(server.url()))
        .await
        .unwrap();

    assert_eq!(summary.failed(), 1);
    let broken = summary.report("broken").unwrap();
    assert_eq!(broken.outcome, FetchOutcome::Failed);
    assert!(broken.error.as_deref().unwrap().contains("400"));
    assert!(summary.report("events").unwrap().is_success());

    assert_eq!(state.get("src", "broken").unwrap(), Some(CursorValue::Integer(50)));
    assert_eq!(state.get("src", "events").unwrap(), Some(CursorValue::Integer(10)));

    drop(runner);
    let states: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|m| matches!(m, Message::State { .. }))
        .map(|m| m.stream().to_string())
        .collect();
    assert_eq!(states, vec!["src.events".to_string()]);
}

#[tokio::test]
async fn test_message_order_per_stream() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();

    let _events = server
        .mock("GET", "/events")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"data": [{"id": 1, "updated_at": 10}, {"id": 2, "updated_at": 20}]}"#)
        .create_async()
        .await;
    let _tags = server
        .mock("GET", "/tags")
        .with_status(200)
        .with_body(r#"{"data": [{"id": "a"}, {"id": "b"}, {"id": "c"}]}"#)
        .create_async()
        .await;

    let (tx, mut rx) = mpsc::channel(64);
    let runner = Runner::new(store(&dir), tx);
    let summary = runner
        .run_source(&source(&["events", "tags"]), FakeConnector::new(server.url()))
        .await
        .unwrap();
    drop(runner);
    let messages = drain(&mut rx);

    let kinds = |stream: &str| -> Vec<&'static str> {
        messages
            .iter()
            .filter(|m| m.stream() == stream)
            .map(|m| match m {
                Message::Schema { .. } => "schema",
                Message::Record { .. } => "record",
                Message::State { .. } => "state",
            })
            .collect()
    };
    assert_eq!(kinds("src.events"), vec!["schema", "record", "record", "state"]);
    assert_eq!(kinds("src.tags"), vec!["schema", "record", "record", "record"]);

    let state = messages
        .iter()
        .find(|m| matches!(m, Message::State { .. }))
        .unwrap();
    match state {
        Message::State { value, run_id, .. } => {
            assert_eq!(value, &serde_json::json!(20));
            assert_eq!(*run_id, summary.run_id);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_unknown_resource_selection() {
    let dir = TempDir::new().unwrap();
    let (tx, _rx) = mpsc::channel(8);
    let runner = Runner::new(store(&dir), tx);

    let err = runner
        .run_source(&source(&["events", "invoices"]), FakeConnector::new("http://localhost".into()))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("invoices"));
    assert!(message.contains("events"));
}

#[tokio::test]
async fn test_unsorted_resource_cut_short_keeps_previous_watermark() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let state = store(&dir);
    let run_id = uuid::Uuid::now_v7();
    state.set("src", "shuffled", &CursorValue::Integer(50), &run_id).unwrap();

    let first_page = server
        .mock("GET", "/shuffled")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"data": [{"id": 1, "updated_at": 300}, {"id": 2, "updated_at": 200}]}"#)
        .expect(1)
        .create_async()
        .await;

    let text = r#"
        [[sources]]
        name = "src"
        connector = "fake"
        resources = ["shuffled"]

        [sources.fetch]
        max_pages = 1
    "#;
    let source = SluiceConfig::from_toml_str(text).unwrap().sources.remove(0);

    let (tx, mut rx) = mpsc::channel(64);
    let runner = Runner::new(Arc::clone(&state), tx);
    let summary = runner
        .run_source(&source, FakeConnector::new(server.url()))
        .await
        .unwrap();

    first_page.assert_async().await;
    let report = summary.report("shuffled").unwrap();
    assert!(report.is_success());
    assert_eq!(report.records, 2);
    assert_eq!(report.outcome, FetchOutcome::PageLimit);
    assert_eq!(report.watermark, None);
    assert_eq!(state.get("src", "shuffled").unwrap(), Some(CursorValue::Integer(50)));

    drop(runner);
    assert!(!drain(&mut rx)
        .iter()
        .any(|m| matches!(m, Message::State { .. })));
}
