//! Per-view list loading state.
//!
//! A [`ListQuery`] owns the filter/sort/page state of one list page and the
//! loading state derived from it. Fetches run on spawned tasks and report
//! back through a channel that the view drains on each tick.
//!
//! # Example
//!
//! ```ignore
//! let mut query = ListQuery::new(fetcher.clone(), Resource::Providers, QueryState::new());
//! query.fetch()?;
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     LoadState::Loading => render_spinner(),
//!     LoadState::Success(fetched) => render_rows(&fetched.view),
//!     LoadState::Error(e) => render_error(e),
//!     LoadState::Idle => {}
//! }
//! ```
//!
//! Every fetch is stamped with a sequence number. Only the response to the
//! latest one is applied; a slower, older response arriving afterwards is
//! dropped, so the view never flips back to a superseded query.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::{FetchError, Fetched, ListFetcher, ListView};
use crate::cache::CacheSource;
use crate::listing::{QueryError, QueryState, Resource};

/// The state of a list query
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
  /// Nothing requested yet
  Idle,
  /// A request is outstanding
  Loading,
  /// The latest request produced a list (possibly empty)
  Success(Fetched),
  /// The latest request failed and nothing was cached
  Error(FetchError),
}

impl LoadState {
  pub fn is_loading(&self) -> bool {
    matches!(self, LoadState::Loading)
  }

  pub fn data(&self) -> Option<&Fetched> {
    match self {
      LoadState::Success(fetched) => Some(fetched),
      _ => None,
    }
  }
}

impl From<Fetched> for LoadState {
  fn from(fetched: Fetched) -> Self {
    match fetched.view {
      ListView::Error(e) => LoadState::Error(e),
      _ => LoadState::Success(fetched),
    }
  }
}

/// Write operations a view can trigger on a row
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
  Delete(u64),
  Restore(u64),
  #[allow(dead_code)]
  Patch(u64, Value),
}

impl Mutation {
  fn describe(&self) -> String {
    match self {
      Mutation::Delete(id) => format!("Moved #{} to trash", id),
      Mutation::Restore(id) => format!("Restored #{}", id),
      Mutation::Patch(id, _) => format!("Updated #{}", id),
    }
  }

  fn describe_failure(&self, error: &FetchError) -> String {
    let (verb, id) = match self {
      Mutation::Delete(id) => ("delete", id),
      Mutation::Restore(id) => ("restore", id),
      Mutation::Patch(id, _) => ("update", id),
    };
    format!("Could not {} #{}: {}", verb, id, error)
  }
}

/// Message from a spawned task back to its query
#[derive(Debug)]
struct Outcome {
  seq: u64,
  fetched: Fetched,
  notice: Option<String>,
}

/// Loading state machine for one list page.
pub struct ListQuery {
  fetcher: ListFetcher,
  resource: Resource,
  params: QueryState,
  state: LoadState,
  notice: Option<String>,
  /// Sequence number of the latest request
  seq: u64,
  tx: mpsc::UnboundedSender<Outcome>,
  rx: mpsc::UnboundedReceiver<Outcome>,
}

impl ListQuery {
  pub fn new(fetcher: ListFetcher, resource: Resource, params: QueryState) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      fetcher,
      resource,
      params,
      state: LoadState::Idle,
      notice: None,
      seq: 0,
      tx,
      rx,
    }
  }

  pub fn resource(&self) -> Resource {
    self.resource
  }

  pub fn params(&self) -> &QueryState {
    &self.params
  }

  pub fn state(&self) -> &LoadState {
    &self.state
  }

  /// Result of the last write, for the status line
  pub fn notice(&self) -> Option<&str> {
    self.notice.as_deref()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  /// Change the query state and fetch it.
  ///
  /// The change is only kept if the new state serializes; on error the
  /// previous state stays in place.
  pub fn update(&mut self, f: impl FnOnce(&mut QueryState)) -> Result<(), QueryError> {
    let mut params = self.params.clone();
    f(&mut params);
    let key = params.cache_key(self.resource)?;
    self.params = params;
    self.load(key);
    Ok(())
  }

  /// Load the current query state.
  ///
  /// A fresh cache entry is applied immediately without a network request.
  pub fn fetch(&mut self) -> Result<(), QueryError> {
    let key = self.params.cache_key(self.resource)?;
    self.load(key);
    Ok(())
  }

  /// Reload from the network, ignoring any cached copy.
  pub fn refetch(&mut self) -> Result<(), QueryError> {
    let key = self.params.cache_key(self.resource)?;
    let seq = self.next_seq();
    self.start(seq, key, None, true);
    Ok(())
  }

  /// Run a write against one row, then reload the current page.
  pub fn mutate(&mut self, mutation: Mutation) -> Result<(), QueryError> {
    let key = self.params.cache_key(self.resource)?;
    let seq = self.next_seq();
    self.start(seq, key, Some(mutation), false);
    Ok(())
  }

  fn load(&mut self, key: String) {
    let seq = self.next_seq();

    if let Some(result) = self.fetcher.peek_key(&key) {
      debug!(seq, %key, "list served from cache");
      self.state = LoadState::Success(Fetched::new(result.into(), CacheSource::Cache));
      return;
    }

    self.start(seq, key, None, false);
  }

  /// Apply results from finished tasks.
  ///
  /// Returns `true` if the state changed. Call this in the event loop tick.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;

    while let Ok(outcome) = self.rx.try_recv() {
      if outcome.seq != self.seq {
        debug!(
          seq = outcome.seq,
          latest = self.seq,
          "discarding stale response"
        );
        continue;
      }

      if let Some(notice) = outcome.notice {
        self.notice = Some(notice);
      }
      self.state = outcome.fetched.into();
      changed = true;
    }

    changed
  }

  fn next_seq(&mut self) -> u64 {
    self.seq += 1;
    self.seq
  }

  fn start(&mut self, seq: u64, key: String, mutation: Option<Mutation>, refresh: bool) {
    self.state = LoadState::Loading;

    let fetcher = self.fetcher.clone();
    let resource = self.resource;
    let tx = self.tx.clone();

    tokio::spawn(async move {
      let notice = match mutation {
        Some(mutation) => {
          let result = match &mutation {
            Mutation::Delete(id) => fetcher.delete_item(resource, *id).await,
            Mutation::Restore(id) => fetcher.restore_item(resource, *id).await,
            Mutation::Patch(id, changes) => fetcher.patch_item(resource, *id, changes.clone()).await,
          };
          Some(match result {
            Ok(()) => mutation.describe(),
            Err(e) => mutation.describe_failure(&e),
          })
        }
        None => None,
      };

      let fetched = if refresh {
        fetcher.refresh_key(resource, &key).await
      } else {
        fetcher.fetch_key(resource, &key).await
      };

      // Ignore send errors - the view may be gone
      let _ = tx.send(Outcome {
        seq,
        fetched,
        notice,
      });
    });
  }
}

impl std::fmt::Debug for ListQuery {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ListQuery")
      .field("resource", &self.resource)
      .field("params", &self.params)
      .field("state", &self.state)
      .field("seq", &self.seq)
      .finish_non_exhaustive()
  }
}
