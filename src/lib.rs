//! Sluice - incremental paginated fetching for SaaS source connectors.
//!
//! Almost every source connector repeats the same loop: remember a
//! high-water mark, page through an API, stop when pages run out or the
//! records pass the end of the requested range, and retry on transient
//! failures. This crate is that loop, written once.
//!
//! # Architecture
//!
//! ```text
//!   TimeChunks (optional)        CursorState
//!   day / hour / month / N-day   last_value, end_value
//!          ↓                           ↑ advance per emitted record
//! ┌─────────────────────────────────────────┐
//! │       IncrementalFetch                   │
//! │  - one sub-session per chunk             │
//! │  - early stop past end_value             │
//! │  - cancellation between pages            │
//! └─────────────────────────────────────────┘
//!          ↓ PageRequest        ↑ PageResult
//! ┌─────────────────────────────────────────┐
//! │       PageFetcher (Pagination enum)      │
//! │  - offset / cursor / scroll / single     │
//! │  - response shape, GraphQL errors        │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       RetryClient                        │
//! │  - retry-on-status, bounded backoff      │
//! └─────────────────────────────────────────┘
//!          ↓
//!     Provider API
//! ```
//!
//! # Example
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use sluice::{
//!     CursorState, IncrementalFetch, PageFetcher, PageRequest, Pagination, ResponseShape,
//!     RetryClient, RetryPolicy, TokenSource,
//! };
//!
//! # async fn run() -> Result<(), sluice::FetchError> {
//! let client = RetryClient::new(RetryPolicy::transient([429, 502, 503]))?;
//! let fetcher = PageFetcher::new(client, "https://api.example.com")
//!     .pagination(Pagination::cursor(
//!         "starting_after",
//!         TokenSource::body("pages.next.starting_after"),
//!     ))
//!     .shape(ResponseShape::path("data"));
//!
//! let cursor = CursorState::new("updated_at").initial_value(0);
//! let mut fetch = IncrementalFetch::new(fetcher, PageRequest::new("/contacts")).cursor(cursor);
//!
//! let records: Vec<_> = fetch.records().try_collect().await?;
//! println!("{} records, watermark {:?}", records.len(), fetch.cursor_state().and_then(|c| c.last_value()));
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod config;
pub mod cursor;
pub mod error;
pub mod fetch;
pub mod http;
pub mod normalize;
pub mod page;
pub mod poll;
pub mod record;

pub use chunk::{ChunkBound, Granularity, TimeChunk, TimeChunks};
pub use cursor::{CursorField, CursorOrder, CursorState, CursorValue, MissingValue, Verdict};
pub use error::{FetchError, Result};
pub use fetch::{ChunkPlan, FetchOutcome, IncrementalFetch};
pub use http::{RetryClient, RetryPolicy};
pub use page::{
    Auth, FetchPage, OffsetUnit, PageFetcher, PageRequest, PageResult, PageToken, Pagination,
    RequestBody, ResponseShape, TokenSource,
};
pub use record::Record;
