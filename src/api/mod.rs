//! Client for the directory's REST API.
//!
//! [`ListFetcher`] is the entry point: it serializes list queries, answers
//! from the [`TtlCache`](crate::cache::TtlCache) when it can, coalesces
//! identical in-flight requests and normalizes the response envelopes the
//! endpoints return.

mod envelope;
mod fetcher;
#[cfg(test)]
pub mod mock;
mod transport;
mod types;

pub use fetcher::ListFetcher;
pub use transport::{HttpTransport, Transport};
#[cfg(test)]
pub use transport::Method;
pub use types::{FetchError, Fetched, ListResult, ListView, Record};
