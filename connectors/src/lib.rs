//! Sluice connectors - SaaS source adapters on top of the `sluice` fetch engine.
//!
//! An adapter knows one provider: its base URL, authentication, which
//! pagination strategy each endpoint uses, where the items live in a
//! response and how to filter a time range. It turns a resource name and a
//! [`SyncWindow`] into a [`FetchPlan`]; the [`Runner`] does the rest.
//!
//! # Architecture
//!
//! ```text
//!   sluice.toml (sources)          watermarks (SQLite)
//!          ↓                              ↑ ↓
//! ┌─────────────────────────────────────────┐
//! │       Runner                             │
//! │  - one task per resource                 │
//! │  - resume from last watermark            │
//! │  - run lookups, then the session         │
//! │  - persist watermark on success          │
//! └─────────────────────────────────────────┘
//!          ↓ plan(resource, window)
//! ┌─────────────────────────────────────────┐
//! │       Connector (implements trait)       │
//! │  - Intercom, Stripe, Fireflies,          │
//! │    monday.com, Hostaway                  │
//! └─────────────────────────────────────────┘
//!          ↓ FetchPlan
//! ┌─────────────────────────────────────────┐
//! │       sluice::IncrementalFetch           │
//! └─────────────────────────────────────────┘
//!          ↓
//!     SCHEMA / RECORD / STATE lines on stdout
//! ```
//!
//! # Core Types
//!
//! - [`Connector`] - Trait that all adapters implement
//! - [`ResourceSpec`] - Name, primary key and write disposition of a resource
//! - [`SyncWindow`] - Configured date range plus the persisted watermark
//! - [`FetchPlan`] - Fetcher, first request, cursor and chunks of one resource,
//!   optionally behind a lookup of parent records
//! - [`Runner`] - Runs a source's resources and keeps their watermarks
//!
//! # Running a Source
//!
//! ```no_run
//! use sluice_connectors::output::write_messages;
//! use sluice_connectors::registry::build_connector;
//! use sluice_connectors::{Runner, SluiceConfig, StateStore};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = SluiceConfig::load("sluice.toml")?;
//! let state = Arc::new(StateStore::new(&config.state_db)?);
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(1024);
//! let writer = tokio::spawn(async move { write_messages(rx, &mut tokio::io::stdout()).await });
//!
//! let runner = Runner::new(state, tx);
//! for source in &config.sources {
//!     let summary = runner.run_source(source, build_connector(source)?).await?;
//!     println!("{}: {} failed", summary.source, summary.failed());
//! }
//!
//! drop(runner);
//! writer.await??;
//! # Ok(())
//! # }
//! ```

mod connector;
mod types;
pub mod config;
pub mod connectors;
pub mod output;
pub mod registry;
pub mod runner;
pub mod state;

// Re-export public types
pub use config::{SluiceConfig, SourceConfig};
pub use connector::Connector;
pub use output::Message;
pub use runner::{ResourceReport, ResourceStatus, RunSummary, Runner};
pub use state::StateStore;
pub use types::{
    ColumnHint, FetchPlan, IncrementalSpec, ResourceSpec, SyncWindow, WriteDisposition,
};
