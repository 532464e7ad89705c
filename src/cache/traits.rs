//! Core types for the caching system.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cached value as it is written to the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub value: Value,
  pub stored_at: DateTime<Utc>,
  pub ttl_secs: u64,
}

impl CacheEntry {
  pub fn new(value: Value, stored_at: DateTime<Utc>, ttl_secs: u64) -> Self {
    Self {
      value,
      stored_at,
      ttl_secs,
    }
  }

  /// An entry is fresh while `now - stored_at < ttl`.
  pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
    let ttl = Duration::seconds(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX));
    now - self.stored_at < ttl
  }
}

/// Source of the current time. Injected so expiry can be tested.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock(std::sync::Mutex<DateTime<Utc>>);

#[cfg(test)]
impl ManualClock {
  pub fn new() -> Self {
    let start = DateTime::parse_from_rfc3339("2024-05-01T09:00:00Z")
      .unwrap()
      .with_timezone(&Utc);
    Self(std::sync::Mutex::new(start))
  }

  pub fn advance(&self, secs: i64) {
    let mut now = self.0.lock().unwrap();
    *now += Duration::seconds(secs);
  }
}

#[cfg(test)]
impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.0.lock().unwrap()
  }
}

/// Indicates where list data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still within its TTL
  Cache,
  /// Network failed, serving an unexpired cache entry
  Offline,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_entry_fresh_until_ttl() {
    let clock = ManualClock::new();
    let entry = CacheEntry::new(json!(1), clock.now(), 60);

    assert!(entry.is_fresh(clock.now()));
    clock.advance(59);
    assert!(entry.is_fresh(clock.now()));
    clock.advance(1);
    assert!(!entry.is_fresh(clock.now()));
  }

  #[test]
  fn test_zero_ttl_is_never_fresh() {
    let clock = ManualClock::new();
    let entry = CacheEntry::new(json!("x"), clock.now(), 0);
    assert!(!entry.is_fresh(clock.now()));
  }

  #[test]
  fn test_entry_json_shape() {
    let clock = ManualClock::new();
    let entry = CacheEntry::new(json!({"total": 0}), clock.now(), 30);
    let encoded = serde_json::to_value(&entry).unwrap();
    assert_eq!(encoded["value"], json!({"total": 0}));
    assert_eq!(encoded["stored_at"], json!("2024-05-01T09:00:00Z"));
    assert_eq!(encoded["ttl_secs"], json!(30));
  }
}
