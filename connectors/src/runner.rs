//! Resource runner.
//!
//! Runs every selected resource of a source concurrently, one task per
//! resource. Each task loads the previous watermark, asks the connector for
//! a fetch plan, runs the plan's lookups, drives the session and streams its
//! records to the output writer. A failing resource is logged and reported; its siblings keep
//! running and its watermark is left untouched.

use crate::config::SourceConfig;
use crate::output::Message;
use crate::state::StateStore;
use crate::types::{FetchPlan, ResourceSpec, SyncWindow};
use crate::Connector;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use sluice::config::FetchSettings;
use sluice::{CursorValue, FetchOutcome, IncrementalFetch, PageFetcher};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Status information for one `(source, resource)` pair.
#[derive(Clone, Debug, Default)]
pub struct ResourceStatus {
    /// Last successful run timestamp
    pub last_run: Option<DateTime<Utc>>,
    /// Last error message (if any)
    pub last_error: Option<String>,
    /// Total number of successful runs
    pub run_count: u64,
    /// Total number of failed runs
    pub error_count: u64,
    /// Records delivered by the last run
    pub records: u64,
}

/// Result of one resource session.
#[derive(Clone, Debug)]
pub struct ResourceReport {
    pub resource: String,
    pub records: u64,
    pub outcome: FetchOutcome,
    /// Watermark persisted by this run
    pub watermark: Option<CursorValue>,
    pub error: Option<String>,
}

impl ResourceReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of one source run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub source: String,
    pub run_id: Uuid,
    /// One report per resource, ordered by name
    pub resources: Vec<ResourceReport>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.resources.iter().filter(|r| !r.is_success()).count()
    }

    pub fn report(&self, resource: &str) -> Option<&ResourceReport> {
        self.resources.iter().find(|r| r.resource == resource)
    }
}

/// Drives connector resources and persists their watermarks.
pub struct Runner {
    state: Arc<StateStore>,
    sender: mpsc::Sender<Message>,
    cancel: CancellationToken,
    status: Arc<tokio::sync::Mutex<HashMap<String, ResourceStatus>>>,
}

impl Runner {
    pub fn new(state: Arc<StateStore>, sender: mpsc::Sender<Message>) -> Self {
        Self {
            state,
            sender,
            cancel: CancellationToken::new(),
            status: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Cancelling `token` stops every running session before its next page.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns a clone of the status tracker for external monitoring.
    ///
    /// Keyed by `<source>.<resource>`.
    pub fn status(&self) -> Arc<tokio::sync::Mutex<HashMap<String, ResourceStatus>>> {
        Arc::clone(&self.status)
    }

    /// Runs the selected resources of `source` and waits for all of them.
    ///
    /// Fails only when the selection or date range is invalid. Resource
    /// failures are reported in the summary.
    pub async fn run_source(
        &self,
        source: &SourceConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<RunSummary> {
        let selected = select_resources(source, connector.as_ref())?;
        let window = source.window()?;
        let run_id = Uuid::now_v7();

        info!(
            source = %source.name,
            connector = %connector.name(),
            run_id = %run_id,
            resources = selected.len(),
            "Starting source run"
        );

        let mut tasks = JoinSet::new();
        for spec in selected {
            let job = ResourceJob {
                source: source.name.clone(),
                spec,
                connector: Arc::clone(&connector),
                window: window.clone(),
                settings: source.fetch.clone(),
                state: Arc::clone(&self.state),
                sender: self.sender.clone(),
                cancel: self.cancel.child_token(),
                run_id,
            };
            tasks.spawn(job.run());
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    self.update_status(&source.name, &report).await;
                    reports.push(report);
                }
                Err(e) => {
                    error!(source = %source.name, error = %e, "Resource task aborted");
                }
            }
        }
        reports.sort_by(|a, b| a.resource.cmp(&b.resource));

        let summary = RunSummary {
            source: source.name.clone(),
            run_id,
            resources: reports,
        };
        info!(
            source = %source.name,
            run_id = %run_id,
            succeeded = summary.resources.len() - summary.failed(),
            failed = summary.failed(),
            "Source run finished"
        );
        Ok(summary)
    }

    async fn update_status(&self, source: &str, report: &ResourceReport) {
        let mut map = self.status.lock().await;
        let status = map
            .entry(format!("{}.{}", source, report.resource))
            .or_default();
        status.records = report.records;
        match &report.error {
            None => {
                status.last_run = Some(Utc::now());
                status.last_error = None;
                status.run_count += 1;
            }
            Some(e) => {
                status.last_error = Some(e.clone());
                status.error_count += 1;
            }
        }
    }
}

/// The configured resource selection, or every declared resource.
fn select_resources(source: &SourceConfig, connector: &dyn Connector) -> Result<Vec<ResourceSpec>> {
    let declared = connector.resources();
    let Some(names) = &source.resources else {
        return Ok(declared);
    };

    let mut selected = Vec::with_capacity(names.len());
    for name in names {
        match declared.iter().find(|r| &r.name == name) {
            Some(spec) => selected.push(spec.clone()),
            None => {
                let available: Vec<_> = declared.iter().map(|r| r.name.as_str()).collect();
                bail!(
                    "unknown resource `{}` for connector `{}` (available: {})",
                    name,
                    connector.name(),
                    available.join(", ")
                );
            }
        }
    }
    Ok(selected)
}

/// One resource session, owned by its task.
struct ResourceJob {
    source: String,
    spec: ResourceSpec,
    connector: Arc<dyn Connector>,
    window: SyncWindow,
    settings: FetchSettings,
    state: Arc<StateStore>,
    sender: mpsc::Sender<Message>,
    cancel: CancellationToken,
    run_id: Uuid,
}

impl ResourceJob {
    async fn run(self) -> ResourceReport {
        let resource = self.spec.name.clone();
        let mut records = 0u64;
        match self.execute(&mut records).await {
            Ok((outcome, watermark)) => {
                info!(
                    source = %self.source,
                    resource = %resource,
                    records = records,
                    outcome = ?outcome,
                    "Resource finished"
                );
                ResourceReport {
                    resource,
                    records,
                    outcome,
                    watermark,
                    error: None,
                }
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(
                    source = %self.source,
                    resource = %resource,
                    records = records,
                    error = %message,
                    "Resource failed, watermark not updated"
                );
                ResourceReport {
                    resource,
                    records,
                    outcome: FetchOutcome::Failed,
                    watermark: None,
                    error: Some(message),
                }
            }
        }
    }

    async fn execute(&self, records: &mut u64) -> Result<(FetchOutcome, Option<CursorValue>)> {
        let stream = format!("{}.{}", self.source, self.spec.name);

        let last_value = if self.spec.is_incremental() {
            self.state.get(&self.source, &self.spec.name)?
        } else {
            None
        };
        debug!(stream = %stream, last_value = ?last_value, "Loaded watermark");

        let window = self.window.clone().resume_from(last_value);
        let plan = self
            .connector
            .plan(&self.spec.name, &window)
            .await
            .with_context(|| format!("Failed to plan {}", stream))?;
        let plan = resolve(plan, &self.settings, &self.cancel)
            .await
            .with_context(|| format!("Failed to look up parents of {}", stream))?;

        self.send(Message::schema(&stream, &self.spec)).await?;

        let mut fetch = build_fetch(plan, &self.settings, self.cancel.clone());
        while let Some(record) = fetch
            .next_record()
            .await
            .with_context(|| format!("Failed to fetch {}", stream))?
        {
            self.send(Message::record(&stream, record)).await?;
            *records += 1;
        }

        let outcome = fetch.outcome();
        let watermark = if self.spec.is_incremental() {
            fetch.resume_value().cloned()
        } else {
            None
        };
        if watermark.is_none() && fetch.cursor_state().map_or(false, |c| c.last_value() != c.start_value()) {
            info!(
                stream = %stream,
                outcome = ?outcome,
                "Unsorted session stopped early, keeping previous watermark"
            );
        }

        if let Some(value) = &watermark {
            self.state
                .set(&self.source, &self.spec.name, value, &self.run_id)
                .with_context(|| format!("Failed to persist watermark of {}", stream))?;
            self.send(Message::State {
                stream,
                value: value.to_json(),
                run_id: self.run_id,
            })
            .await?;
        }
        Ok((outcome, watermark))
    }

    async fn send(&self, message: Message) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| anyhow!("output channel closed"))
    }
}

/// Runs the lookup stages of `plan` and returns the plan that yields the
/// resource's records.
///
/// Lookups share the resource's settings and cancel token. A cancelled
/// lookup hands over the records read so far; the following session then
/// stops before its first page.
pub async fn resolve(
    mut plan: FetchPlan,
    settings: &FetchSettings,
    cancel: &CancellationToken,
) -> Result<FetchPlan> {
    while let Some(then) = plan.then.take() {
        let mut lookup = build_fetch(plan, settings, cancel.clone());
        let records = lookup.collect().await?;
        debug!(
            records = records.len(),
            outcome = ?lookup.outcome(),
            "Lookup finished"
        );
        plan = then(records)?;
    }
    Ok(plan)
}

/// Applies the source's throttling and limits to a connector plan.
pub fn build_fetch(
    plan: FetchPlan,
    settings: &FetchSettings,
    cancel: CancellationToken,
) -> IncrementalFetch<PageFetcher> {
    let mut fetch = IncrementalFetch::new(plan.fetcher, plan.initial)
        .normalizer(plan.normalize)
        .cancel_token(cancel);
    if let Some(cursor) = plan.cursor {
        fetch = fetch.cursor(cursor);
    }
    if let Some(mut chunks) = plan.chunks {
        if let Some(delay) = settings.chunk_delay() {
            chunks = chunks.delay(delay);
        }
        fetch = fetch.chunks(chunks);
    }
    if let Some(delay) = settings.page_delay() {
        fetch = fetch.page_delay(delay);
    }
    if let Some(limit) = settings.max_pages {
        fetch = fetch.max_pages(limit);
    }
    fetch
}
