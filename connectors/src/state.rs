//! Watermark storage.
//!
//! One row per `(source, resource)` holding the last persisted cursor value
//! as JSON text. Rows are only written after a session ends without error,
//! so a failed run resumes from the previous watermark.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sluice::CursorValue;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// A persisted watermark.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredState {
    pub source: String,
    pub resource: String,
    pub last_value: CursorValue,
    /// Run that wrote the value
    pub run_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// Persists watermarks in SQLite.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Opens (or creates) the SQLite database and ensures the table exists.
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open state DB at {}", db_path))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_table()?;
        Ok(store)
    }

    /// Creates the `watermarks` table if it does not already exist.
    pub fn create_table(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS watermarks (
                    source      TEXT NOT NULL,
                    resource    TEXT NOT NULL,
                    last_value  TEXT NOT NULL,
                    run_id      TEXT NOT NULL,
                    updated_at  TEXT NOT NULL,
                    PRIMARY KEY (source, resource)
                );",
            )
            .context("Failed to create watermarks table")?;
        Ok(())
    }

    /// The watermark of the last successful run, if any.
    pub fn get(&self, source: &str, resource: &str) -> Result<Option<CursorValue>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT last_value FROM watermarks WHERE source = ?1 AND resource = ?2",
                params![source, resource],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read watermark")?;
        raw.map(|text| decode_value(&text)).transpose()
    }

    /// Inserts or replaces the watermark of `(source, resource)`.
    pub fn set(
        &self,
        source: &str,
        resource: &str,
        value: &CursorValue,
        run_id: &Uuid,
    ) -> Result<()> {
        let encoded = serde_json::to_string(value).context("Failed to serialize watermark")?;
        self.lock()?
            .execute(
                "INSERT INTO watermarks (source, resource, last_value, run_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (source, resource) DO UPDATE SET
                    last_value = excluded.last_value,
                    run_id = excluded.run_id,
                    updated_at = excluded.updated_at",
                params![
                    source,
                    resource,
                    encoded,
                    run_id.to_string(),
                    Utc::now().to_rfc3339()
                ],
            )
            .context("Failed to store watermark")?;
        Ok(())
    }

    /// All watermarks of a source, ordered by resource.
    pub fn list(&self, source: &str) -> Result<Vec<StoredState>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT source, resource, last_value, run_id, updated_at
             FROM watermarks WHERE source = ?1 ORDER BY resource ASC",
        )?;
        let rows = stmt
            .query_map(params![source], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list watermarks")?;

        rows.into_iter()
            .map(|(source, resource, value, run_id, updated_at)| {
                Ok(StoredState {
                    source,
                    resource,
                    last_value: decode_value(&value)?,
                    run_id: Uuid::parse_str(&run_id).context("Invalid run_id in state DB")?,
                    updated_at: DateTime::parse_from_rfc3339(&updated_at)
                        .context("Invalid updated_at in state DB")?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }

    /// Forgets a watermark so the next run starts from the configured start.
    pub fn reset(&self, source: &str, resource: &str) -> Result<bool> {
        let removed = self
            .lock()?
            .execute(
                "DELETE FROM watermarks WHERE source = ?1 AND resource = ?2",
                params![source, resource],
            )
            .context("Failed to delete watermark")?;
        Ok(removed > 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("state DB connection lock poisoned"))
    }
}

fn decode_value(text: &str) -> Result<CursorValue> {
    serde_json::from_str(text).with_context(|| format!("Invalid watermark `{}`", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn in_memory_store() -> StateStore {
        StateStore::new(":memory:").expect("in-memory store failed")
    }

    #[test]
    fn test_get_missing() {
        let store = in_memory_store();
        assert_eq!(store.get("billing", "charges").unwrap(), None);
    }

    #[test]
    fn test_set_and_get_kinds() {
        let store = in_memory_store();
        let run = Uuid::now_v7();
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();

        store.set("support", "contacts", &CursorValue::Integer(1714552200), &run).unwrap();
        store.set("meetings", "analytics", &CursorValue::Timestamp(ts), &run).unwrap();
        store.set("boards", "updates", &CursorValue::Text("b-17".into()), &run).unwrap();

        assert_eq!(
            store.get("support", "contacts").unwrap(),
            Some(CursorValue::Integer(1714552200))
        );
        assert_eq!(
            store.get("meetings", "analytics").unwrap(),
            Some(CursorValue::Timestamp(ts))
        );
        assert_eq!(
            store.get("boards", "updates").unwrap(),
            Some(CursorValue::Text("b-17".into()))
        );
    }

    #[test]
    fn test_upsert_replaces_value() {
        let store = in_memory_store();
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();

        store.set("billing", "charges", &CursorValue::Integer(10), &first).unwrap();
        store.set("billing", "charges", &CursorValue::Integer(20), &second).unwrap();

        let states = store.list("billing").unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].last_value, CursorValue::Integer(20));
        assert_eq!(states[0].run_id, second);
    }

    #[test]
    fn test_list_is_per_source_and_sorted() {
        let store = in_memory_store();
        let run = Uuid::now_v7();
        store.set("billing", "invoices", &CursorValue::Integer(1), &run).unwrap();
        store.set("billing", "charges", &CursorValue::Integer(2), &run).unwrap();
        store.set("support", "contacts", &CursorValue::Integer(3), &run).unwrap();

        let names: Vec<_> = store
            .list("billing")
            .unwrap()
            .into_iter()
            .map(|s| s.resource)
            .collect();
        assert_eq!(names, vec!["charges", "invoices"]);
    }

    #[test]
    fn test_reset() {
        let store = in_memory_store();
        store
            .set("billing", "charges", &CursorValue::Integer(5), &Uuid::now_v7())
            .unwrap();
        assert!(store.reset("billing", "charges").unwrap());
        assert!(!store.reset("billing", "charges").unwrap());
        assert_eq!(store.get("billing", "charges").unwrap(), None);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let path = path.to_str().unwrap();

        {
            let store = StateStore::new(path).unwrap();
            store
                .set("support", "tickets", &CursorValue::Integer(42), &Uuid::now_v7())
                .unwrap();
        }

        let reopened = StateStore::new(path).unwrap();
        assert_eq!(
            reopened.get("support", "tickets").unwrap(),
            Some(CursorValue::Integer(42))
        );
    }
}
