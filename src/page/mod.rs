//! One page at a time.
//!
//! A [`PageFetcher`] turns a [`PageRequest`] into a [`PageResult`]: it
//! encodes the request ([`RequestBody`]), sends it through the
//! [`RetryClient`](crate::RetryClient), pulls the items out of the response
//! ([`ResponseShape`]) and works out the continuation token for the
//! configured [`Pagination`] strategy.

mod fetcher;
mod graphql;
mod pagination;
mod shape;

pub use fetcher::{Auth, PageFetcher};
pub use graphql::{attach_item_errors, error_messages};
pub use pagination::{OffsetUnit, Pagination, TokenSource};
pub use shape::{RequestBody, ResponseShape};

use crate::error::Result;
use crate::record::Record;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Opaque continuation value: a page number/offset, or a cursor/scroll string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageToken {
    Number(u64),
    Cursor(String),
}

impl PageToken {
    pub fn to_json(&self) -> Value {
        match self {
            PageToken::Number(n) => Value::from(*n),
            PageToken::Cursor(s) => Value::String(s.clone()),
        }
    }

    /// Builds a cursor token from a JSON string or number.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(PageToken::Cursor(s.clone())),
            Value::Number(n) => Some(PageToken::Cursor(n.to_string())),
            _ => None,
        }
    }
}

/// Description of one API call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageRequest {
    /// Path relative to the fetcher's base URL, or an absolute URL.
    pub endpoint: String,
    /// Query string, JSON body fields (dotted paths) or GraphQL variables,
    /// depending on the [`RequestBody`].
    pub params: BTreeMap<String, Value>,
    /// Token this request continues from. `None` for the first page.
    pub token: Option<PageToken>,
}

impl PageRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn with_token(mut self, token: PageToken) -> Self {
        self.token = Some(token);
        self
    }
}

/// One page of items plus what comes next.
///
/// Built through [`PageResult::last`] or [`PageResult::more`], so a last
/// page never carries a token.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub items: Vec<Record>,
    next_token: Option<PageToken>,
}

impl PageResult {
    pub fn last(items: Vec<Record>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }

    pub fn more(items: Vec<Record>, token: PageToken) -> Self {
        Self {
            items,
            next_token: Some(token),
        }
    }

    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }

    pub fn next_token(&self) -> Option<&PageToken> {
        self.next_token.as_ref()
    }

    pub fn into_parts(self) -> (Vec<Record>, Option<PageToken>) {
        (self.items, self.next_token)
    }
}

/// Source of pages for the orchestrator.
#[async_trait]
pub trait FetchPage: Send + Sync {
    /// Fetches the page described by `request`.
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult>;

    /// Builds the request for the page after `previous`.
    fn next_request(&self, previous: &PageRequest, token: PageToken) -> PageRequest {
        previous.clone().with_token(token)
    }
}

#[cfg(test)]
mod tests;
