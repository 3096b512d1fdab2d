use super::ResponseShape;
use crate::error::{FetchError, Result};
use crate::record::{get_path, Record};
use serde_json::Value;
use std::collections::BTreeMap;

/// Messages of a GraphQL `errors` array, `Unknown error` when one has none.
pub fn error_messages(body: &Value) -> Vec<String> {
    body.get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown error")
                        .to_string()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Extracts items from a GraphQL response.
///
/// An `errors` array with nothing usable under the items path is fatal.
/// With partial data the errors are attached to the items they point at.
pub(crate) fn extract(body: &Value, shape: &ResponseShape) -> Result<Vec<Record>> {
    let messages = error_messages(body);
    if messages.is_empty() {
        return shape.extract(body);
    }

    let usable = match shape {
        ResponseShape::Path(path) => get_path(body, path).map_or(false, |v| !v.is_null()),
        _ => body.get("data").map_or(false, |v| !v.is_null()),
    };
    if !usable {
        return Err(FetchError::Protocol(format!(
            "GraphQL error: {}",
            messages.join(", ")
        )));
    }

    let mut items = shape.extract(body)?;
    let field = match shape {
        ResponseShape::Path(path) => path.rsplit('.').next().unwrap_or(path.as_str()),
        _ => "",
    };
    attach_item_errors(body, field, &mut items);
    Ok(items)
}

/// Sets `error` on every item: the comma-joined names of the fields that
/// failed for that item, or `null`.
///
/// Only errors whose `path` looks like `[field, index, attribute, ...]`
/// count; anything else is left to the caller.
pub fn attach_item_errors(body: &Value, field: &str, items: &mut [Record]) {
    let mut by_index: BTreeMap<usize, Vec<String>> = BTreeMap::new();

    let errors = body.get("errors").and_then(Value::as_array);
    for error in errors.into_iter().flatten() {
        let Some(path) = error.get("path").and_then(Value::as_array) else {
            continue;
        };
        if path.len() < 3 || path[0].as_str() != Some(field) {
            continue;
        }
        let (Some(index), Some(attribute)) = (path[1].as_u64(), path[2].as_str()) else {
            continue;
        };
        by_index
            .entry(index as usize)
            .or_default()
            .push(attribute.to_string());
    }

    for (index, item) in items.iter_mut().enumerate() {
        let value = by_index
            .get(&index)
            .map(|fields| Value::String(fields.join(", ")))
            .unwrap_or(Value::Null);
        item.insert("error".to_string(), value);
    }
}
