//! Field normalization helpers for adapters.

use crate::record::Record;
use serde_json::Value;

/// Flattens one level of nesting.
///
/// - `null` stays `null`
/// - `{"id": x}` under `key` becomes `key_id = x`
/// - any other non-empty object becomes `key_sub` fields (values kept as is)
/// - an empty object is dropped
/// - a list of `{"id": x}` objects becomes a list of ids
/// - any other list becomes a JSON string
/// - scalars are kept
pub fn flatten(record: Record) -> Record {
    let mut out = Record::new();
    for (key, value) in record {
        match value {
            Value::Object(map) => {
                if map.len() == 1 && map.contains_key("id") {
                    let id = map.get("id").cloned().unwrap_or(Value::Null);
                    out.insert(format!("{}_id", key), id);
                } else {
                    for (sub, sub_value) in map {
                        out.insert(format!("{}_{}", key, sub), sub_value);
                    }
                }
            }
            Value::Array(items) => {
                let id_only = matches!(
                    items.first(),
                    Some(Value::Object(first)) if first.len() == 1 && first.contains_key("id")
                );
                let flat = if id_only {
                    Value::Array(
                        items
                            .iter()
                            .map(|item| item.get("id").cloned().unwrap_or(Value::Null))
                            .collect(),
                    )
                } else {
                    Value::String(Value::Array(items).to_string())
                };
                out.insert(key, flat);
            }
            other => {
                out.insert(key, other);
            }
        }
    }
    out
}

/// Replaces the object at `key` with selected sub-fields.
///
/// Each `(sub, target)` pair copies `key.sub` into `target` (`null` when
/// absent). Does nothing when `key` is missing or not an object.
pub fn hoist(record: &mut Record, key: &str, fields: &[(&str, &str)]) {
    if !matches!(record.get(key), Some(Value::Object(_))) {
        return;
    }
    if let Some(Value::Object(nested)) = record.remove(key) {
        for (sub, target) in fields {
            let value = nested.get(*sub).cloned().unwrap_or(Value::Null);
            record.insert((*target).to_string(), value);
        }
    }
}

/// Ids of the objects in the list at `key`, skipping items without one.
pub fn ids_of(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id"))
                .filter(|id| !id.is_null())
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Inserts `default` under `key` unless the key is present.
pub fn ensure(record: &mut Record, key: &str, default: Value) {
    record.entry(key.to_string()).or_insert(default);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_flatten_objects() {
        let flat = flatten(record(json!({
            "id": "1",
            "creator": {"id": 42},
            "board": {"id": 7, "name": "Roadmap"},
            "settings": {},
            "deleted_at": null
        })));

        assert_eq!(flat["creator_id"], json!(42));
        assert_eq!(flat["board_id"], json!(7));
        assert_eq!(flat["board_name"], json!("Roadmap"));
        assert!(!flat.contains_key("settings"));
        assert!(!flat.contains_key("board"));
        assert_eq!(flat["deleted_at"], Value::Null);
        assert_eq!(flat["id"], json!("1"));
    }

    #[test]
    fn test_flatten_is_one_level() {
        let flat = flatten(record(json!({"owner": {"name": "a", "team": {"id": 1}}})));
        assert_eq!(flat["owner_team"], json!({"id": 1}));
    }

    #[test]
    fn test_flatten_lists() {
        let flat = flatten(record(json!({
            "subscribers": [{"id": 1}, {"id": 2}],
            "tags": ["a", "b"],
            "columns": [{"id": "c", "title": "Status"}],
            "empty": []
        })));

        assert_eq!(flat["subscribers"], json!([1, 2]));
        assert_eq!(flat["tags"], json!(r#"["a","b"]"#));
        assert_eq!(flat["columns"], json!(r#"[{"id":"c","title":"Status"}]"#));
        assert_eq!(flat["empty"], json!("[]"));
    }

    #[test]
    fn test_hoist() {
        let mut r = record(json!({"id": 1, "location": {"country": "NL", "city": "Utrecht"}}));
        hoist(
            &mut r,
            "location",
            &[
                ("country", "location_country"),
                ("region", "location_region"),
                ("city", "location_city"),
            ],
        );
        assert_eq!(r["location_country"], json!("NL"));
        assert_eq!(r["location_region"], Value::Null);
        assert!(!r.contains_key("location"));

        let mut untouched = record(json!({"location": "NL"}));
        hoist(&mut untouched, "location", &[("country", "location_country")]);
        assert_eq!(untouched["location"], json!("NL"));
    }

    #[test]
    fn test_ids_of() {
        let companies = json!([{"id": "a"}, {"name": "no id"}, {"id": null}, {"id": "b"}]);
        assert_eq!(ids_of(Some(&companies)), vec![json!("a"), json!("b")]);
        assert!(ids_of(None).is_empty());
    }

    #[test]
    fn test_ensure() {
        let mut r = record(json!({"custom_attributes": {"tier": 1}}));
        ensure(&mut r, "custom_attributes", json!({}));
        ensure(&mut r, "tags", json!([]));
        assert_eq!(r["custom_attributes"], json!({"tier": 1}));
        assert_eq!(r["tags"], json!([]));
    }
}
