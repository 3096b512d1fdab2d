//! Incremental fetch orchestration.
//!
//! [`IncrementalFetch`] drives a [`FetchPage`] implementation page by page
//! and hands records out one at a time:
//!
//! ```text
//! INIT → FETCHING_PAGE → (EMIT_RECORDS → FETCHING_PAGE)* → DONE
//! ```
//!
//! DONE is reached when the fetcher reports the last page (of the last
//! chunk or parent), when a record passes the cursor's end value, on cancellation,
//! on the page limit, or on the first error. The cursor only moves when a
//! record is handed to the caller, so whatever stopped the session, the
//! cursor never covers a record the caller did not receive.

use crate::chunk::{TimeChunk, TimeChunks};
use crate::cursor::{CursorState, CursorValue, Verdict};
use crate::error::{FetchError, Result};
use crate::page::{FetchPage, PageRequest};
use crate::record::Record;
use chrono::SecondsFormat;
use futures::stream::{self, Stream};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-record field mapping applied before the cursor sees the record.
pub type Normalizer = Box<dyn Fn(Record) -> Record + Send + Sync>;

type RequestBuilder = Box<dyn Fn(&TimeChunk) -> PageRequest + Send + Sync>;
type ParentBuilder = Box<dyn Fn(&Value) -> PageRequest + Send + Sync>;

/// Fields stamped on every record of a sub-session.
type Tags = Vec<(String, Value)>;

enum Segments {
    Time {
        chunks: TimeChunks,
        build: RequestBuilder,
        annotate: Option<(String, String)>,
    },
    Parents {
        ids: std::vec::IntoIter<Value>,
        build: ParentBuilder,
        key: String,
    },
}

impl Segments {
    fn next(&mut self) -> Option<(PageRequest, Tags)> {
        match self {
            Segments::Time {
                chunks,
                build,
                annotate,
            } => {
                let chunk = chunks.next()?;
                debug!(start = %chunk.start, end = %chunk.end, "Starting chunk");
                let tags = match annotate {
                    Some((start_key, end_key)) => vec![
                        (start_key.clone(), rfc3339(chunk.start)),
                        (end_key.clone(), rfc3339(chunk.end)),
                    ],
                    None => Vec::new(),
                };
                Some((build(&chunk), tags))
            }
            Segments::Parents { ids, build, key } => {
                let id = ids.next()?;
                debug!(parent = %id, "Starting parent");
                Some((build(&id), vec![(key.clone(), id)]))
            }
        }
    }
}

fn rfc3339(t: chrono::DateTime<chrono::Utc>) -> Value {
    Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Runs one paginated sub-session per time chunk, or per parent id.
pub struct ChunkPlan {
    segments: Segments,
    delay: Option<Duration>,
}

impl ChunkPlan {
    /// `build` turns each chunk into the first request of its sub-session.
    pub fn new<F>(chunks: TimeChunks, build: F) -> Self
    where
        F: Fn(&TimeChunk) -> PageRequest + Send + Sync + 'static,
    {
        Self {
            segments: Segments::Time {
                chunks,
                build: Box::new(build),
                annotate: None,
            },
            delay: None,
        }
    }

    /// One sub-session per id, in order. Every record of a sub-session gets
    /// its parent id under `key`.
    pub fn per_parent<F>(ids: Vec<Value>, key: impl Into<String>, build: F) -> Self
    where
        F: Fn(&Value) -> PageRequest + Send + Sync + 'static,
    {
        Self {
            segments: Segments::Parents {
                ids: ids.into_iter(),
                build: Box::new(build),
                key: key.into(),
            },
            delay: None,
        }
    }

    /// Writes the chunk bounds (RFC 3339) into every record of the chunk.
    /// Has no effect on a per-parent plan.
    pub fn annotate(mut self, start_key: impl Into<String>, end_key: impl Into<String>) -> Self {
        if let Segments::Time { annotate, .. } = &mut self.segments {
            *annotate = Some((start_key.into(), end_key.into()));
        }
        self
    }

    /// Pause between chunks.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Running,
    /// The last page was reached.
    Exhausted,
    /// A record passed the cursor's end value.
    OutOfRange,
    Cancelled,
    /// The `max_pages` limit was hit.
    PageLimit,
    Failed,
}

/// A lazy, finite, non-restartable sequence of records.
pub struct IncrementalFetch<F> {
    fetcher: F,
    cursor: Option<CursorState>,
    normalize: Option<Normalizer>,
    chunks: Option<ChunkPlan>,
    tags: Tags,
    pending: Option<PageRequest>,
    buffer: VecDeque<Record>,
    past_end: bool,
    outcome: FetchOutcome,
    page_delay: Option<Duration>,
    max_pages: Option<u64>,
    cancel: CancellationToken,
    pages_fetched: u64,
    chunks_started: u64,
    records_emitted: u64,
}

impl<F: FetchPage> IncrementalFetch<F> {
    /// Session starting at `initial`. Ignored when a [`ChunkPlan`] is set.
    pub fn new(fetcher: F, initial: PageRequest) -> Self {
        Self {
            fetcher,
            cursor: None,
            normalize: None,
            chunks: None,
            tags: Vec::new(),
            pending: Some(initial),
            buffer: VecDeque::new(),
            past_end: false,
            outcome: FetchOutcome::Running,
            page_delay: None,
            max_pages: None,
            cancel: CancellationToken::new(),
            pages_fetched: 0,
            chunks_started: 0,
            records_emitted: 0,
        }
    }

    pub fn cursor(mut self, cursor: CursorState) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn normalize<N>(mut self, normalize: N) -> Self
    where
        N: Fn(Record) -> Record + Send + Sync + 'static,
    {
        self.normalize = Some(Box::new(normalize));
        self
    }

    pub fn normalizer(mut self, normalize: Option<Normalizer>) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn chunks(mut self, plan: ChunkPlan) -> Self {
        self.chunks = Some(plan);
        self.pending = None;
        self
    }

    /// Fixed pause before every page after the first.
    pub fn page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = Some(delay);
        self
    }

    pub fn max_pages(mut self, limit: u64) -> Self {
        self.max_pages = Some(limit);
        self
    }

    /// Token checked before each page fetch.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cursor_state(&self) -> Option<&CursorState> {
        self.cursor.as_ref()
    }

    pub fn into_cursor(self) -> Option<CursorState> {
        self.cursor
    }

    pub fn outcome(&self) -> FetchOutcome {
        self.outcome
    }

    /// The watermark a later session may safely start from, if it moved.
    ///
    /// A sorted cursor can always resume from its last value. An unsorted
    /// one only once the session read everything: records it never reached
    /// may carry smaller values.
    pub fn resume_value(&self) -> Option<&CursorValue> {
        let cursor = self.cursor.as_ref()?;
        let complete = matches!(
            self.outcome,
            FetchOutcome::Exhausted | FetchOutcome::OutOfRange
        );
        if cursor.is_sorted() || complete {
            cursor.last_value()
        } else {
            None
        }
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    pub fn records_emitted(&self) -> u64 {
        self.records_emitted
    }

    /// Next record, or `None` once the session is done.
    ///
    /// After an error the session is done; later calls return `Ok(None)`.
    pub async fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(raw) = self.buffer.pop_front() {
                match self.emit(raw) {
                    Ok(Some(record)) => return Ok(Some(record)),
                    Ok(None) => continue,
                    Err(e) => return Err(self.fail(e)),
                }
            }

            if self.outcome != FetchOutcome::Running {
                return Ok(None);
            }
            if self.past_end {
                self.finish(FetchOutcome::OutOfRange);
                return Ok(None);
            }

            if self.cancel.is_cancelled() {
                self.finish(FetchOutcome::Cancelled);
                return Ok(None);
            }

            let request = match self.pending.take() {
                Some(request) => request,
                None => match self.next_chunk().await {
                    Some(request) => request,
                    None => {
                        self.finish(FetchOutcome::Exhausted);
                        return Ok(None);
                    }
                },
            };

            if self.max_pages.map_or(false, |limit| self.pages_fetched >= limit) {
                warn!(limit = self.pages_fetched, "Page limit reached, stopping");
                self.finish(FetchOutcome::PageLimit);
                return Ok(None);
            }
            if self.pages_fetched > 0 {
                if let Some(delay) = self.page_delay {
                    tokio::time::sleep(delay).await;
                }
            }

            let page = match self.fetcher.fetch_page(&request).await {
                Ok(page) => page,
                Err(e) => return Err(self.fail(e)),
            };
            self.pages_fetched += 1;

            let (mut items, token) = page.into_parts();
            debug!(
                endpoint = %request.endpoint,
                page = self.pages_fetched,
                items = items.len(),
                last = token.is_none(),
                "Fetched page"
            );

            for item in &mut items {
                for (key, value) in &self.tags {
                    item.insert(key.clone(), value.clone());
                }
            }

            self.pending = token.map(|token| self.fetcher.next_request(&request, token));
            self.buffer.extend(items);
        }
    }

    /// The session as a stream. Dropping the stream leaves the session
    /// where it stopped.
    pub fn records(&mut self) -> impl Stream<Item = Result<Record>> + '_ {
        stream::try_unfold(self, |this| async move {
            Ok::<_, FetchError>(this.next_record().await?.map(|record| (record, this)))
        })
    }

    /// Drains the session into a vector.
    pub async fn collect(&mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record().await? {
            records.push(record);
        }
        Ok(records)
    }

    async fn next_chunk(&mut self) -> Option<PageRequest> {
        let plan = self.chunks.as_mut()?;
        let (request, tags) = plan.segments.next()?;
        if self.chunks_started > 0 {
            if let Some(delay) = plan.delay {
                tokio::time::sleep(delay).await;
            }
        }
        self.chunks_started += 1;
        self.tags = tags;
        Some(request)
    }

    fn emit(&mut self, raw: Record) -> Result<Option<Record>> {
        let record = match &self.normalize {
            Some(normalize) => normalize(raw),
            None => raw,
        };
        if let Some(cursor) = &mut self.cursor {
            match cursor.observe(&record)? {
                Verdict::Emit => cursor.advance(&record)?,
                Verdict::Skip => return Ok(None),
                Verdict::OutOfRange => {
                    if cursor.is_sorted() {
                        self.past_end = true;
                    }
                    return Ok(None);
                }
            }
        }
        self.records_emitted += 1;
        Ok(Some(record))
    }

    fn finish(&mut self, outcome: FetchOutcome) {
        self.outcome = outcome;
        self.buffer.clear();
        self.pending = None;
        info!(
            outcome = ?outcome,
            pages = self.pages_fetched,
            records = self.records_emitted,
            "Fetch session finished"
        );
    }

    fn fail(&mut self, error: FetchError) -> FetchError {
        warn!(error = %error, pages = self.pages_fetched, "Fetch session failed");
        self.finish(FetchOutcome::Failed);
        error
    }
}
