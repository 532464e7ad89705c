use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::CacheSource;

/// A single row of a list endpoint (provider, review, appointment, ...)
pub type Record = Map<String, Value>;

/// Why a request did not produce a list.
///
/// Clone so that every caller sharing one in-flight request gets the error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
  /// The request never produced a response (connection, DNS, timeout)
  #[error("network error: {0}")]
  Network(String),
  /// The server answered with a non-2xx status
  #[error("HTTP {status}{}", .message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
  Status { status: u16, message: Option<String> },
  /// The envelope said `success: false`
  #[error("request rejected: {0}")]
  Api(String),
  /// Body was not JSON or not a known envelope shape
  #[error("malformed response: {0}")]
  MalformedResponse(String),
}

/// Normalized list payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
  pub items: Vec<Record>,
  pub total: u64,
}

impl ListResult {
  pub fn new(items: Vec<Record>, total: u64) -> Self {
    Self { items, total }
  }

  /// Numeric id of a record; the API sends it as a number or a numeric string.
  pub fn record_id(record: &Record) -> Option<u64> {
    match record.get("id")? {
      Value::Number(n) => n.as_u64(),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    }
  }
}

/// What a list page should render.
#[derive(Debug, Clone, PartialEq)]
pub enum ListView {
  /// The request succeeded and matched nothing
  Empty,
  /// The request succeeded with at least one record
  Loaded(ListResult),
  /// The request failed and nothing usable was cached
  Error(FetchError),
}

impl ListView {
  pub fn items(&self) -> &[Record] {
    match self {
      ListView::Loaded(result) => &result.items,
      _ => &[],
    }
  }

  pub fn total(&self) -> u64 {
    match self {
      ListView::Loaded(result) => result.total,
      _ => 0,
    }
  }
}

impl From<ListResult> for ListView {
  fn from(result: ListResult) -> Self {
    if result.items.is_empty() {
      ListView::Empty
    } else {
      ListView::Loaded(result)
    }
  }
}

/// Outcome of a list fetch together with where the data came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
  pub view: ListView,
  pub source: CacheSource,
}

impl Fetched {
  pub fn new(view: ListView, source: CacheSource) -> Self {
    Self { view, source }
  }
}
