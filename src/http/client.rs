use super::RetryPolicy;
use crate::error::{FetchError, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client that retries transient failures according to a [`RetryPolicy`].
///
/// Transient means a status in the policy's retry set, a connect failure or
/// a timeout. Any other non-2xx status fails immediately with
/// [`FetchError::Upstream`]. Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct RetryClient {
    http: Client,
    policy: RetryPolicy,
}

impl RetryClient {
    /// Builds a client whose per-request timeout comes from the policy.
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("sluice/", env!("CARGO_PKG_VERSION")))
            .timeout(policy.timeout)
            .build()?;
        Ok(Self { http, policy })
    }

    /// Wraps an existing `reqwest` client.
    pub fn with_client(http: Client, policy: RetryPolicy) -> Self {
        Self { http, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.http.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.http.post(url)
    }

    /// Sends a request, retrying per policy. Returns the first 2xx response.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let pending = request.try_clone().ok_or_else(|| {
                FetchError::InvalidRequest("request body cannot be replayed for retries".into())
            })?;

            match pending.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(url = %response.url(), attempt, "Request succeeded");
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !self.policy.should_retry(status) {
                        let body = response.text().await.unwrap_or_default();
                        return Err(FetchError::Upstream { status, body });
                    }
                    if attempt >= max_attempts {
                        let body = response.text().await.unwrap_or_default();
                        warn!(status, attempts = attempt, "Retries exhausted");
                        return Err(FetchError::Upstream { status, body });
                    }
                    let wait = self
                        .policy
                        .delay_with_hint(attempt, retry_after(&response));
                    warn!(
                        url = %response.url(),
                        status,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "Transient upstream status, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) if is_transient(&e) && attempt < max_attempts => {
                    let wait = self.policy.delay(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "Transient transport error, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(FetchError::Transport(e)),
            }
        }
    }

    /// Sends a request and parses a JSON body.
    pub async fn send_json(&self, request: RequestBuilder) -> Result<serde_json::Value> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
