//! Two-level TTL cache: an in-memory mirror over a durable store.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CacheEntry, Clock, SystemClock};

/// Key-value cache with lazy expiry.
///
/// Reads check memory first and fall back to the durable store, promoting
/// fresh entries into memory. Writes go to both. Failures of the durable
/// store are logged and otherwise behave like a miss, so callers never see
/// a cache error.
///
/// Entries are not shared across processes beyond what the durable store
/// provides: another process's writes are only noticed once the local
/// memory copy expires or is invalidated.
pub struct TtlCache {
  storage: Box<dyn CacheStorage>,
  memory: Mutex<HashMap<String, CacheEntry>>,
  clock: Arc<dyn Clock>,
}

impl TtlCache {
  /// Create a new cache over the given durable storage.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self {
      storage: Box::new(storage),
      memory: Mutex::new(HashMap::new()),
      clock: Arc::new(SystemClock),
    }
  }

  /// Replace the clock used for expiry checks.
  #[allow(dead_code)]
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  fn memory(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    // A panic while holding the lock leaves the map usable
    self.memory.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Look up a fresh value.
  pub fn get(&self, key: &str) -> Option<Value> {
    let now = self.clock.now();

    {
      let mut memory = self.memory();
      if let Some(entry) = memory.get(key) {
        if entry.is_fresh(now) {
          debug!(key, "cache hit (memory)");
          return Some(entry.value.clone());
        }
        memory.remove(key);
      }
    }

    let raw = match self.storage.read(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => {
        debug!(key, "cache miss");
        return None;
      }
      Err(e) => {
        warn!(key, error = %e, "cache read failed, treating as miss");
        return None;
      }
    };

    match serde_json::from_str::<CacheEntry>(&raw) {
      Ok(entry) if entry.is_fresh(now) => {
        debug!(key, "cache hit (storage)");
        let value = entry.value.clone();
        self.memory().insert(key.to_string(), entry);
        Some(value)
      }
      Ok(_) => {
        debug!(key, "cache entry expired");
        self.remove_stored(key);
        None
      }
      Err(e) => {
        warn!(key, error = %e, "dropping malformed cache entry");
        self.remove_stored(key);
        None
      }
    }
  }

  /// Store a value for `ttl_secs` seconds, replacing any previous entry.
  pub fn set(&self, key: &str, value: Value, ttl_secs: u64) {
    let now = self.clock.now();
    let entry = CacheEntry::new(value, now, ttl_secs);

    match serde_json::to_string(&entry) {
      Ok(data) => {
        if let Err(e) = self.storage.write(key, &data) {
          warn!(key, error = %e, "cache write failed, keeping entry in memory only");
        }
      }
      Err(e) => warn!(key, error = %e, "failed to encode cache entry"),
    }

    // Expired entries for keys never read again would otherwise pile up
    let mut memory = self.memory();
    memory.retain(|_, e| e.is_fresh(now));
    memory.insert(key.to_string(), entry);
  }

  /// Remove every entry whose key matches `predicate`.
  ///
  /// Returns the number of distinct keys removed.
  pub fn invalidate(&self, predicate: impl Fn(&str) -> bool) -> usize {
    let mut removed: HashSet<String> = HashSet::new();

    self.memory().retain(|key, _| {
      if predicate(key) {
        removed.insert(key.clone());
        false
      } else {
        true
      }
    });

    match self.storage.keys() {
      Ok(keys) => {
        for key in keys.into_iter().filter(|k| predicate(k)) {
          self.remove_stored(&key);
          removed.insert(key);
        }
      }
      Err(e) => warn!(error = %e, "failed to list cache keys for invalidation"),
    }

    debug!(count = removed.len(), "invalidated cache entries");
    removed.len()
  }

  /// Remove everything from both layers.
  pub fn clear(&self) {
    self.memory().clear();
    if let Err(e) = self.storage.clear() {
      warn!(error = %e, "failed to clear cache storage");
    }
  }

  fn remove_stored(&self, key: &str) {
    if let Err(e) = self.storage.remove(key) {
      warn!(key, error = %e, "failed to remove cache entry");
    }
  }
}
