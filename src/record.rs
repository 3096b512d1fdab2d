//! Record type and dotted-path helpers.
//!
//! Paths like `pages.next.starting_after` address nested JSON objects. A
//! numeric segment indexes into an array (`data.0.id`).

use serde_json::{Map, Value};

/// One source record, as a JSON object.
pub type Record = Map<String, Value>;

/// Looks up a dotted path. Returns `None` when any segment is missing.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Looks up a dotted path starting from a record.
pub fn get_field<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let value = record.get(head)?;
    match rest {
        Some(rest) => get_path(value, rest),
        None => Some(value),
    }
}

/// Writes `new_value` at a dotted path, creating intermediate objects.
///
/// Non-object intermediates are replaced by objects.
pub fn set_path(target: &mut Value, path: &str, new_value: Value) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        match path.split_once('.') {
            Some((head, rest)) => {
                let child = map.entry(head.to_string()).or_insert(Value::Null);
                set_path(child, rest, new_value);
            }
            None => {
                map.insert(path.to_string(), new_value);
            }
        }
    }
}

/// Treats `null`, missing and empty strings as absent.
pub fn non_empty(value: Option<&Value>) -> Option<&Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_path_nested() {
        let body = json!({"pages": {"next": {"starting_after": "abc"}}});
        assert_eq!(
            get_path(&body, "pages.next.starting_after"),
            Some(&json!("abc"))
        );
        assert_eq!(get_path(&body, "pages.prev"), None);
        assert_eq!(get_path(&body, ""), Some(&body));
    }

    #[test]
    fn test_get_path_array_index() {
        let body = json!({"data": [{"id": 1}, {"id": 2}]});
        assert_eq!(get_path(&body, "data.1.id"), Some(&json!(2)));
        assert_eq!(get_path(&body, "data.5.id"), None);
    }

    #[test]
    fn test_get_field_from_record() {
        let record = json!({"statistics": {"last_close_at": 17}})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(
            get_field(&record, "statistics.last_close_at"),
            Some(&json!(17))
        );
        assert!(get_field(&record, "missing").is_none());
    }

    #[test]
    fn test_set_path_creates_objects() {
        let mut body = json!({"query": {"field": "updated_at"}});
        set_path(&mut body, "pagination.starting_after", json!("tok"));
        set_path(&mut body, "pagination.per_page", json!(150));
        assert_eq!(
            body,
            json!({
                "query": {"field": "updated_at"},
                "pagination": {"starting_after": "tok", "per_page": 150}
            })
        );
    }

    #[test]
    fn test_non_empty() {
        assert!(non_empty(Some(&json!(""))).is_none());
        assert!(non_empty(Some(&Value::Null)).is_none());
        assert!(non_empty(None).is_none());
        assert_eq!(non_empty(Some(&json!("x"))), Some(&json!("x")));
    }
}
