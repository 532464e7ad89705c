//! Time-bounded cache for API responses.
//!
//! This module provides a two-level cache that:
//! - Keeps entries in memory for fast repeated reads
//! - Mirrors every entry into a durable store so it survives restarts
//! - Expires entries lazily on read once their TTL has passed
//! - Degrades to a cache miss whenever the durable store misbehaves

mod layer;
mod storage;
mod traits;

pub use layer::TtlCache;
pub use storage::{NoopStorage, SqliteStorage};
pub use traits::CacheSource;

#[cfg(test)]
pub use traits::ManualClock;
