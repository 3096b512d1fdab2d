//! Retrying HTTP client shared by all fetchers of one connector instance.

mod client;
mod policy;

pub use client::RetryClient;
pub use policy::RetryPolicy;
