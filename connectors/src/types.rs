use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sluice::fetch::Normalizer;
use sluice::{
    ChunkPlan, CursorField, CursorState, CursorValue, Granularity, PageFetcher, PageRequest, Record,
    TimeChunks,
};
use std::collections::BTreeMap;

/// How the loader applies a resource's records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteDisposition {
    /// Truncate and reload.
    Replace,
    /// Upsert by primary key.
    Merge,
}

/// Column type hint passed through to the loader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnHint {
    Text,
    BigInt,
    Double,
    Bool,
    Timestamp,
    Json,
}

/// Incremental loading settings of a resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncrementalSpec {
    /// Record field holding the watermark.
    pub cursor_field: String,
}

/// Declaration of one resource a connector can extract.
///
/// # Example
/// ```
/// use sluice_connectors::{ColumnHint, ResourceSpec, WriteDisposition};
///
/// let contacts = ResourceSpec::new("contacts", &["id"])
///     .incremental("updated_at")
///     .column("custom_attributes", ColumnHint::Json);
///
/// assert_eq!(contacts.write_disposition, WriteDisposition::Merge);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Resource name, unique within a connector
    pub name: String,

    /// Primary key field(s)
    pub primary_key: Vec<String>,

    /// `merge` for incremental resources, `replace` otherwise
    pub write_disposition: WriteDisposition,

    /// Optional column type hints
    pub columns: BTreeMap<String, ColumnHint>,

    /// Set for resources that load incrementally
    pub incremental: Option<IncrementalSpec>,
}

impl ResourceSpec {
    /// A full-refresh resource keyed by `primary_key`.
    pub fn new(name: &str, primary_key: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            primary_key: primary_key.iter().map(|k| k.to_string()).collect(),
            write_disposition: WriteDisposition::Replace,
            columns: BTreeMap::new(),
            incremental: None,
        }
    }

    /// Loads incrementally on `cursor_field` and switches to merge.
    pub fn incremental(mut self, cursor_field: &str) -> Self {
        self.incremental = Some(IncrementalSpec {
            cursor_field: cursor_field.to_string(),
        });
        self.write_disposition = WriteDisposition::Merge;
        self
    }

    pub fn column(mut self, name: &str, hint: ColumnHint) -> Self {
        self.columns.insert(name.to_string(), hint);
        self
    }

    pub fn is_incremental(&self) -> bool {
        self.incremental.is_some()
    }
}

/// The time range one run covers, plus the watermark left by the last run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncWindow {
    /// Configured start date
    pub start: Option<DateTime<Utc>>,
    /// Configured end date; open-ended when absent
    pub end: Option<DateTime<Utc>>,
    /// Watermark persisted by the previous successful run
    pub last_value: Option<CursorValue>,
}

impl SyncWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            start,
            end,
            last_value: None,
        }
    }

    pub fn resume_from(mut self, last_value: Option<CursorValue>) -> Self {
        self.last_value = last_value;
        self
    }

    /// Lower bound for request filters: the persisted watermark when it is
    /// a point in time later than the configured start, else the start.
    pub fn since(&self) -> Option<DateTime<Utc>> {
        let resumed = self.last_value.as_ref().and_then(as_datetime);
        match (self.start, resumed) {
            (Some(start), Some(resumed)) => Some(start.max(resumed)),
            (start, resumed) => resumed.or(start),
        }
    }

    /// Upper bound for request filters: the configured end, or now.
    pub fn until(&self) -> DateTime<Utc> {
        self.end.unwrap_or_else(Utc::now)
    }

    /// Cursor over a unix-seconds field.
    pub fn unix_cursor(&self, field: impl Into<CursorField>) -> CursorState {
        let mut cursor = CursorState::new(field);
        if let Some(start) = self.start {
            cursor = cursor.initial_value(start.timestamp());
        }
        if let Some(end) = self.end {
            cursor = cursor.end_value(end.timestamp());
        }
        cursor.resume_from(self.last_value.clone())
    }

    /// Cursor over an RFC 3339 timestamp field.
    pub fn timestamp_cursor(&self, field: impl Into<CursorField>) -> CursorState {
        let mut cursor = CursorState::new(field);
        if let Some(start) = self.start {
            cursor = cursor.initial_value(start);
        }
        if let Some(end) = self.end {
            cursor = cursor.end_value(end);
        }
        cursor.resume_from(self.last_value.clone())
    }
}

fn as_datetime(value: &CursorValue) -> Option<DateTime<Utc>> {
    match value {
        CursorValue::Timestamp(ts) => Some(*ts),
        CursorValue::Integer(secs) => Utc.timestamp_opt(*secs, 0).single(),
        _ => None,
    }
}

/// Builds the next plan from the records of a lookup stage.
pub type Continuation = Box<dyn FnOnce(Vec<Record>) -> anyhow::Result<FetchPlan> + Send>;

/// Everything the runner needs to extract one resource.
///
/// A plan with a continuation is a lookup stage: its records are not
/// emitted but handed to the continuation, which returns the plan to run
/// next. Lookups run with the same throttling, page limit and cancellation
/// as the resource itself.
pub struct FetchPlan {
    pub fetcher: PageFetcher,
    pub initial: PageRequest,
    pub cursor: Option<CursorState>,
    pub chunks: Option<ChunkPlan>,
    pub normalize: Option<Normalizer>,
    pub(crate) then: Option<Continuation>,
}

impl FetchPlan {
    pub fn new(fetcher: PageFetcher, initial: PageRequest) -> Self {
        Self {
            fetcher,
            initial,
            cursor: None,
            chunks: None,
            normalize: None,
            then: None,
        }
    }

    /// A plan that sends no request: an empty range of chunks.
    pub fn empty(fetcher: PageFetcher) -> Self {
        let now = Utc::now();
        let nothing = TimeChunks::new(now, now, Granularity::Day);
        Self::new(fetcher, PageRequest::default())
            .chunks(ChunkPlan::new(nothing, |_| PageRequest::default()))
    }

    pub fn cursor(mut self, cursor: CursorState) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn chunks(mut self, plan: ChunkPlan) -> Self {
        self.chunks = Some(plan);
        self
    }

    pub fn normalize<N>(mut self, normalize: N) -> Self
    where
        N: Fn(Record) -> Record + Send + Sync + 'static,
    {
        self.normalize = Some(Box::new(normalize));
        self
    }

    /// Turns this plan into a lookup stage feeding `build`.
    pub fn then<F>(mut self, build: F) -> Self
    where
        F: FnOnce(Vec<Record>) -> anyhow::Result<FetchPlan> + Send + 'static,
    {
        self.then = Some(Box::new(build));
        self
    }

    pub fn is_lookup(&self) -> bool {
        self.then.is_some()
    }
}
