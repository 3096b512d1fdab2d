//! JSON-lines output stream.
//!
//! Every resource run writes a `SCHEMA` message, then one `RECORD` per
//! record, then (after a successful session with a watermark) a `STATE`
//! message. Messages from concurrently running resources interleave, but
//! each resource's own messages keep this order.

use crate::types::{ColumnHint, ResourceSpec, WriteDisposition};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sluice::Record;
use std::collections::BTreeMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use uuid::Uuid;

/// One line of output.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Schema {
        stream: String,
        key_properties: Vec<String>,
        write_disposition: WriteDisposition,
        columns: BTreeMap<String, ColumnHint>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor_field: Option<String>,
    },
    Record {
        stream: String,
        record: Record,
        time_extracted: DateTime<Utc>,
    },
    State {
        stream: String,
        value: Value,
        run_id: Uuid,
    },
}

impl Message {
    /// `SCHEMA` message for a resource, streamed under `stream`.
    pub fn schema(stream: &str, spec: &ResourceSpec) -> Self {
        Message::Schema {
            stream: stream.to_string(),
            key_properties: spec.primary_key.clone(),
            write_disposition: spec.write_disposition,
            columns: spec.columns.clone(),
            cursor_field: spec.incremental.as_ref().map(|i| i.cursor_field.clone()),
        }
    }

    pub fn record(stream: &str, record: Record) -> Self {
        Message::Record {
            stream: stream.to_string(),
            record,
            time_extracted: Utc::now(),
        }
    }

    pub fn stream(&self) -> &str {
        match self {
            Message::Schema { stream, .. }
            | Message::Record { stream, .. }
            | Message::State { stream, .. } => stream,
        }
    }
}

/// Writes messages as JSON lines until every sender is dropped.
///
/// Returns the number of lines written.
pub async fn write_messages<W>(mut rx: mpsc::Receiver<Message>, out: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message).context("Failed to serialize message")?;
        line.push(b'\n');
        out.write_all(&line)
            .await
            .context("Failed to write output line")?;
        written += 1;
    }
    out.flush().await.context("Failed to flush output")?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_tags() {
        let spec = ResourceSpec::new("charges", &["id"])
            .incremental("created")
            .column("created", ColumnHint::BigInt);
        let schema = serde_json::to_value(Message::schema("billing.charges", &spec)).unwrap();
        assert_eq!(schema["type"], "SCHEMA");
        assert_eq!(schema["stream"], "billing.charges");
        assert_eq!(schema["key_properties"], json!(["id"]));
        assert_eq!(schema["write_disposition"], "merge");
        assert_eq!(schema["cursor_field"], "created");

        let record = json!({"id": "ch_1"}).as_object().cloned().unwrap();
        let line = serde_json::to_value(Message::record("billing.charges", record)).unwrap();
        assert_eq!(line["type"], "RECORD");
        assert_eq!(line["record"]["id"], "ch_1");

        let state = serde_json::to_value(Message::State {
            stream: "billing.charges".into(),
            value: json!(1700000000),
            run_id: Uuid::now_v7(),
        })
        .unwrap();
        assert_eq!(state["type"], "STATE");
        assert_eq!(state["value"], 1700000000);
    }

    #[test]
    fn test_replace_schema_has_no_cursor() {
        let spec = ResourceSpec::new("admins", &["id"]);
        let schema = serde_json::to_value(Message::schema("support.admins", &spec)).unwrap();
        assert_eq!(schema["write_disposition"], "replace");
        assert!(schema.get("cursor_field").is_none());
    }

    #[tokio::test]
    async fn test_write_messages_one_line_each() {
        let (tx, rx) = mpsc::channel(8);
        let spec = ResourceSpec::new("tags", &["id"]);
        tx.send(Message::schema("crm.tags", &spec)).await.unwrap();
        for id in 0..3 {
            let record = json!({"id": id}).as_object().cloned().unwrap();
            tx.send(Message::record("crm.tags", record)).await.unwrap();
        }
        drop(tx);

        let mut buf: Vec<u8> = Vec::new();
        let written = write_messages(rx, &mut buf).await.unwrap();
        assert_eq!(written, 4);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["type"], "SCHEMA");
        assert_eq!(lines[3]["record"]["id"], 2);
    }
}
