use crate::types::{FetchPlan, ResourceSpec, SyncWindow};
use anyhow::Result;
use async_trait::async_trait;

/// Source connector interface for one third-party API.
///
/// A connector only describes requests. It declares its resources and,
/// per run, turns a resource name plus a [`SyncWindow`] into a
/// [`FetchPlan`]. Pagination, cursor tracking, retries and watermark
/// persistence happen outside of it.
///
/// # Lifecycle
/// 1. The runner calls `resources()` to validate the configured selection
/// 2. For each selected resource it loads the previous watermark
/// 3. It calls `plan(resource, window)` and drives the returned plan
/// 4. It persists the final watermark after a successful session
///
/// # Example
/// ```no_run
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use sluice::{PageFetcher, PageRequest, Pagination, RetryClient, RetryPolicy};
/// use sluice_connectors::{Connector, FetchPlan, ResourceSpec, SyncWindow};
///
/// struct ExampleConnector {
///     client: RetryClient,
/// }
///
/// #[async_trait]
/// impl Connector for ExampleConnector {
///     fn name(&self) -> &str {
///         "example"
///     }
///
///     fn resources(&self) -> Vec<ResourceSpec> {
///         vec![ResourceSpec::new("items", &["id"]).incremental("updated_at")]
///     }
///
///     async fn plan(&self, resource: &str, window: &SyncWindow) -> Result<FetchPlan> {
///         let fetcher = PageFetcher::new(self.client.clone(), "https://api.example.com")
///             .pagination(Pagination::offset("offset", 100).with_size_param("limit", 100));
///         Ok(FetchPlan::new(fetcher, PageRequest::new(format!("/{}", resource)))
///             .cursor(window.unix_cursor("updated_at")))
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the unique identifier for this connector.
    ///
    /// Lowercase, matches the `connector` key of a source entry.
    fn name(&self) -> &str;

    /// Declares every resource this connector can extract.
    fn resources(&self) -> Vec<ResourceSpec>;

    /// Builds the fetch plan for one resource.
    ///
    /// # Arguments
    /// * `resource` - A name returned by `resources()`
    /// * `window` - Configured date range and the persisted watermark
    ///
    /// # Returns
    /// * `Ok(FetchPlan)` - Fetcher, first request and optional cursor,
    ///   chunk plan and normalizer
    /// * `Err(...)` - Unknown resource, or a lookup the plan depends on
    ///   failed
    async fn plan(&self, resource: &str, window: &SyncWindow) -> Result<FetchPlan>;

    /// Looks up a resource declaration by name.
    fn resource(&self, name: &str) -> Option<ResourceSpec> {
        self.resources().into_iter().find(|r| r.name == name)
    }
}
