use crate::error::{FetchError, Result};
use crate::http::RetryClient;
use crate::record::{get_path, set_path, Record};
use reqwest::RequestBuilder;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// How request parameters are put on the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    /// `GET` with parameters as the query string.
    #[default]
    Query,
    /// `POST` of a JSON document. Each parameter key is a dotted path
    /// written into a copy of the template.
    Json(Value),
    /// `POST {query, variables}` with parameters as variables.
    GraphQl { query: String },
}

impl RequestBody {
    pub fn graphql(query: impl Into<String>) -> Self {
        RequestBody::GraphQl {
            query: query.into(),
        }
    }

    pub(crate) fn build(
        &self,
        client: &RetryClient,
        url: &str,
        params: &BTreeMap<String, Value>,
    ) -> RequestBuilder {
        match self {
            RequestBody::Query => {
                let pairs: Vec<(&str, String)> = params
                    .iter()
                    .map(|(key, value)| (key.as_str(), query_value(value)))
                    .collect();
                client.get(url).query(&pairs)
            }
            RequestBody::Json(template) => {
                let mut body = template.clone();
                for (path, value) in params {
                    set_path(&mut body, path, value.clone());
                }
                client.post(url).json(&body)
            }
            RequestBody::GraphQl { query } => client
                .post(url)
                .json(&json!({ "query": query, "variables": params })),
        }
    }

    pub fn is_graphql(&self) -> bool {
        matches!(self, RequestBody::GraphQl { .. })
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Where the items live in a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// The body is the list.
    BareList,
    /// Items under a dotted path. A missing path is a protocol error, `null`
    /// or `{}` is an empty page and any other object is a one-item page.
    Path(String),
    /// The first present key among several, or a bare list, or the body
    /// itself as a single item.
    FirstOf(Vec<String>),
}

impl Default for ResponseShape {
    fn default() -> Self {
        ResponseShape::FirstOf(vec![
            "data".to_string(),
            "results".to_string(),
            "result".to_string(),
        ])
    }
}

impl ResponseShape {
    pub fn path(path: impl Into<String>) -> Self {
        ResponseShape::Path(path.into())
    }

    pub fn first_of<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResponseShape::FirstOf(keys.into_iter().map(Into::into).collect())
    }

    /// Normalizes one response body into a list of records.
    pub fn extract(&self, body: &Value) -> Result<Vec<Record>> {
        match self {
            ResponseShape::BareList => match body {
                Value::Array(items) => to_records(items),
                other => Err(FetchError::Protocol(format!(
                    "expected a JSON array, got {}",
                    kind(other)
                ))),
            },
            ResponseShape::Path(path) => match get_path(body, path) {
                Some(found) => items_of(found),
                None => Err(FetchError::Protocol(format!(
                    "response has no `{}` key",
                    path
                ))),
            },
            ResponseShape::FirstOf(keys) => match body {
                Value::Array(items) => to_records(items),
                Value::Object(map) => match keys.iter().find_map(|key| map.get(key)) {
                    Some(found) => items_of(found),
                    None => Ok(vec![map.clone()]),
                },
                Value::Null => Ok(Vec::new()),
                other => Err(FetchError::Protocol(format!(
                    "expected a JSON object or array, got {}",
                    kind(other)
                ))),
            },
        }
    }
}

fn items_of(value: &Value) -> Result<Vec<Record>> {
    match value {
        Value::Array(items) => to_records(items),
        Value::Object(map) if map.is_empty() => Ok(Vec::new()),
        Value::Object(map) => Ok(vec![map.clone()]),
        Value::Null => Ok(Vec::new()),
        other => Err(FetchError::Protocol(format!(
            "expected a list of records, got {}",
            kind(other)
        ))),
    }
}

fn to_records(items: &[Value]) -> Result<Vec<Record>> {
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map.clone()),
            other => Err(FetchError::Protocol(format!(
                "expected each item to be an object, got {}",
                kind(other)
            ))),
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
