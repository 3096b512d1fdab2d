use serde_json::{json, Value};
use sluice::normalize::{ensure, hoist, ids_of};
use sluice::Record;

/// Flattens location, summarizes companies, defaults `custom_attributes`.
pub fn transform_contact(mut contact: Record) -> Record {
    hoist(
        &mut contact,
        "location",
        &[
            ("country", "location_country"),
            ("region", "location_region"),
            ("city", "location_city"),
        ],
    );

    if let Some(Value::Object(companies)) = contact.get("companies") {
        let data = companies.get("data");
        let count = data.and_then(Value::as_array).map_or(0, Vec::len);
        let ids = ids_of(data);
        contact.insert("company_ids".to_string(), Value::Array(ids));
        contact.insert("companies_count".to_string(), json!(count));
    }

    ensure(&mut contact, "custom_attributes", json!({}));
    contact
}

/// Defaults `custom_attributes` and flattens the plan.
pub fn transform_company(mut company: Record) -> Record {
    ensure(&mut company, "custom_attributes", json!({}));
    hoist(&mut company, "plan", &[("id", "plan_id"), ("name", "plan_name")]);
    company
}

/// Lifts reply statistics and counts conversation parts.
pub fn transform_conversation(mut conversation: Record) -> Record {
    hoist(
        &mut conversation,
        "statistics",
        &[
            ("first_contact_reply_at", "first_contact_reply_at"),
            ("first_admin_reply_at", "first_admin_reply_at"),
            ("last_contact_reply_at", "last_contact_reply_at"),
            ("last_admin_reply_at", "last_admin_reply_at"),
            ("median_admin_reply_time", "median_admin_reply_time"),
            ("mean_admin_reply_time", "mean_admin_reply_time"),
        ],
    );

    if let Some(Value::Object(parts)) = conversation.get("conversation_parts") {
        let count = parts.get("total_count").cloned().unwrap_or(json!(0));
        conversation.insert("conversation_parts_count".to_string(), count);
    }
    conversation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_transform_contact() {
        let contact = transform_contact(record(json!({
            "id": "c1",
            "location": {"country": "Ireland", "region": "Dublin", "city": "Dublin"},
            "companies": {"data": [{"id": "co1"}, {"id": "co2"}, {"name": "no id"}]}
        })));

        assert_eq!(contact["location_country"], "Ireland");
        assert_eq!(contact["location_city"], "Dublin");
        assert!(!contact.contains_key("location"));
        assert_eq!(contact["company_ids"], json!(["co1", "co2"]));
        assert_eq!(contact["companies_count"], 3);
        assert_eq!(contact["custom_attributes"], json!({}));
    }

    #[test]
    fn test_transform_contact_keeps_custom_attributes() {
        let contact = transform_contact(record(json!({
            "id": "c2",
            "custom_attributes": {"plan": "pro"}
        })));
        assert_eq!(contact["custom_attributes"], json!({"plan": "pro"}));
        assert!(!contact.contains_key("company_ids"));
    }

    #[test]
    fn test_transform_company() {
        let company = transform_company(record(json!({
            "id": "co1",
            "plan": {"id": "p1", "name": "Enterprise", "type": "plan"}
        })));
        assert_eq!(company["plan_id"], "p1");
        assert_eq!(company["plan_name"], "Enterprise");
        assert!(!company.contains_key("plan"));
        assert_eq!(company["custom_attributes"], json!({}));
    }

    #[test]
    fn test_transform_conversation() {
        let conversation = transform_conversation(record(json!({
            "id": "conv1",
            "statistics": {"first_admin_reply_at": 1700000100, "median_admin_reply_time": 42},
            "conversation_parts": {"total_count": 7, "conversation_parts": []}
        })));
        assert_eq!(conversation["first_admin_reply_at"], 1700000100);
        assert_eq!(conversation["median_admin_reply_time"], 42);
        assert_eq!(conversation["last_contact_reply_at"], Value::Null);
        assert_eq!(conversation["conversation_parts_count"], 7);
        assert!(!conversation.contains_key("statistics"));
    }
}
