use super::graphql;
use super::{FetchPage, PageRequest, PageResult, PageToken, Pagination, RequestBody, ResponseShape};
use crate::error::{FetchError, Result};
use crate::http::RetryClient;
use async_trait::async_trait;
use reqwest::RequestBuilder;
use tracing::debug;

/// Request authentication.
#[derive(Clone)]
pub enum Auth {
    Bearer(String),
    Basic {
        username: String,
        password: Option<String>,
    },
    /// Arbitrary header, e.g. `Authorization: <api key>` without a scheme.
    Header { name: String, value: String },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Bearer(_) => f.write_str("Bearer(***)"),
            Auth::Basic { username, .. } => write!(f, "Basic({}, ***)", username),
            Auth::Header { name, .. } => write!(f, "Header({}: ***)", name),
        }
    }
}

/// HTTP page fetcher for one resource.
///
/// ```no_run
/// use sluice::{PageFetcher, Pagination, ResponseShape, RetryClient, RetryPolicy};
///
/// # fn build() -> sluice::Result<PageFetcher> {
/// let client = RetryClient::new(RetryPolicy::transient([429, 502, 503]))?;
/// Ok(PageFetcher::new(client, "https://api.hostaway.com/v1")
///     .bearer_auth("token")
///     .pagination(Pagination::offset("offset", 100).with_size_param("limit", 100))
///     .shape(ResponseShape::first_of(["result"])))
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: RetryClient,
    base_url: String,
    pagination: Pagination,
    body: RequestBody,
    shape: ResponseShape,
    headers: Vec<(String, String)>,
    auth: Option<Auth>,
    not_found_as_empty: bool,
}

impl PageFetcher {
    /// Single-page GET fetcher with the default response shape.
    pub fn new(client: RetryClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            pagination: Pagination::Single,
            body: RequestBody::Query,
            shape: ResponseShape::default(),
            headers: Vec::new(),
            auth: None,
            not_found_as_empty: false,
        }
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn shape(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.auth(Auth::Bearer(token.into()))
    }

    /// Treat a 404 as an empty last page.
    pub fn not_found_as_empty(mut self, enabled: bool) -> Self {
        self.not_found_as_empty = enabled;
        self
    }

    pub fn get_pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }

    fn decorate(&self, mut builder: RequestBuilder) -> RequestBuilder {
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        match &self.auth {
            Some(Auth::Bearer(token)) => builder.bearer_auth(token),
            Some(Auth::Basic { username, password }) => {
                builder.basic_auth(username, password.as_ref())
            }
            Some(Auth::Header { name, value }) => builder.header(name.as_str(), value.as_str()),
            None => builder,
        }
    }
}

#[async_trait]
impl FetchPage for PageFetcher {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult> {
        let request = self.pagination.prepare(request);
        let url = self.url(&request.endpoint);
        let builder = self.decorate(self.body.build(&self.client, &url, &request.params));

        debug!(url = %url, token = ?request.token, "Fetching page");

        let body = match self.client.send_json(builder).await {
            Ok(body) => body,
            Err(FetchError::Upstream { status: 404, .. }) if self.not_found_as_empty => {
                debug!(url = %url, "Endpoint returned 404, treating as empty");
                return Ok(PageResult::last(Vec::new()));
            }
            Err(e) => return Err(e),
        };

        let items = if self.body.is_graphql() {
            graphql::extract(&body, &self.shape)?
        } else {
            self.shape.extract(&body)?
        };

        Ok(match self.pagination.continuation(&request, &body, &items) {
            Some(token) => PageResult::more(items, token),
            None => PageResult::last(items),
        })
    }

    fn next_request(&self, previous: &PageRequest, token: PageToken) -> PageRequest {
        let previous = self.pagination.prepare(previous);
        self.pagination.apply_token(&previous, token)
    }
}
