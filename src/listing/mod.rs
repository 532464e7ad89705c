//! List queries against the directory API.
//!
//! A list page is described by a [`Resource`] (which endpoint, which filters
//! it understands) and a [`QueryState`] (the filter, sort and paging values
//! the user picked). Serializing the pair yields the query string that is
//! sent over the wire and doubles as the cache key.

mod resource;
mod state;

pub use resource::Resource;
pub use state::{PerPage, QueryError, QueryState, SortOrder};
