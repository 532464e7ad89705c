//! List fetching with caching, request coalescing and stale fallback.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::envelope;
use super::transport::{ApiRequest, RawResponse, Transport};
use super::types::{FetchError, Fetched, ListResult, ListView};
use crate::cache::{CacheSource, TtlCache};
use crate::listing::{QueryError, QueryState, Resource};

type SharedFetch = Shared<BoxFuture<'static, Result<ListResult, FetchError>>>;

/// A request in flight, tagged with the cache generation it started in.
struct InFlight {
  generation: u64,
  future: SharedFetch,
}

struct Inner {
  transport: Arc<dyn Transport>,
  cache: Arc<TtlCache>,
  ttl_secs: u64,
  in_flight: Mutex<HashMap<String, InFlight>>,
  /// Bumped per resource on every invalidation so responses to older
  /// requests for that resource are not written back into the cache.
  generations: Mutex<HashMap<Resource, u64>>,
}

impl Inner {
  fn in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
    self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn generations(&self) -> MutexGuard<'_, HashMap<Resource, u64>> {
    self.generations.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn generation(&self, resource: Resource) -> u64 {
    self.generations().get(&resource).copied().unwrap_or(0)
  }

  async fn request_list(&self, key: &str) -> Result<ListResult, FetchError> {
    let response = self.transport.send(ApiRequest::get(key)).await?;
    check_status(&response)?;
    envelope::parse_list(&response.body)
  }
}

/// Fetches list pages through the cache.
///
/// Cheap to clone; clones share the transport, cache and the registry of
/// in-flight requests.
#[derive(Clone)]
pub struct ListFetcher {
  inner: Arc<Inner>,
}

impl ListFetcher {
  pub fn new(transport: Arc<dyn Transport>, cache: Arc<TtlCache>, ttl_secs: u64) -> Self {
    Self {
      inner: Arc::new(Inner {
        transport,
        cache,
        ttl_secs,
        in_flight: Mutex::new(HashMap::new()),
        generations: Mutex::new(HashMap::new()),
      }),
    }
  }

  pub fn cache(&self) -> &TtlCache {
    &self.inner.cache
  }

  /// Look up a fresh cached result without touching the network.
  #[cfg(test)]
  pub fn peek(&self, resource: Resource, state: &QueryState) -> Result<Option<ListResult>, QueryError> {
    let key = state.cache_key(resource)?;
    Ok(self.peek_key(&key))
  }

  /// Fresh cached result for an already serialized cache key.
  pub fn peek_key(&self, key: &str) -> Option<ListResult> {
    self.cached(key)
  }

  /// Fetch a list page, answering from the cache when a fresh entry exists.
  ///
  /// Only an invalid query is returned as `Err`; transport and response
  /// problems end up in [`ListView::Error`].
  pub async fn fetch(&self, resource: Resource, state: &QueryState) -> Result<Fetched, QueryError> {
    let key = state.cache_key(resource)?;
    Ok(self.fetch_key(resource, &key).await)
  }

  /// [`fetch`](Self::fetch) for a cache key produced by [`QueryState::cache_key`].
  pub async fn fetch_key(&self, resource: Resource, key: &str) -> Fetched {
    if let Some(result) = self.cached(key) {
      return Fetched::new(result.into(), CacheSource::Cache);
    }
    self.load(resource, key).await
  }

  /// Fetch a list page from the network even if a cached copy exists.
  pub async fn refresh(&self, resource: Resource, state: &QueryState) -> Result<Fetched, QueryError> {
    let key = state.cache_key(resource)?;
    Ok(self.refresh_key(resource, &key).await)
  }

  pub async fn refresh_key(&self, resource: Resource, key: &str) -> Fetched {
    self.load(resource, key).await
  }

  /// Move an item to the trash.
  pub async fn delete_item(&self, resource: Resource, id: u64) -> Result<(), FetchError> {
    let path = format!("{}/{}", resource.path(), id);
    self.write(resource, ApiRequest::delete(path)).await
  }

  /// Restore a trashed item.
  pub async fn restore_item(&self, resource: Resource, id: u64) -> Result<(), FetchError> {
    let path = format!("{}/{}/restore", resource.path(), id);
    self.write(resource, ApiRequest::patch(path, None)).await
  }

  /// Partially update an item.
  pub async fn patch_item(&self, resource: Resource, id: u64, changes: Value) -> Result<(), FetchError> {
    let path = format!("{}/{}", resource.path(), id);
    self.write(resource, ApiRequest::patch(path, Some(changes))).await
  }

  /// Drop every cached page of `resource` and forget its in-flight requests.
  pub fn invalidate(&self, resource: Resource) -> usize {
    *self.inner.generations().entry(resource).or_insert(0) += 1;
    self
      .inner
      .in_flight()
      .retain(|key, _| !resource.owns_key(key));
    self.inner.cache.invalidate(|key| resource.owns_key(key))
  }

  async fn write(&self, resource: Resource, request: ApiRequest) -> Result<(), FetchError> {
    let method = request.method;
    let path = request.path.clone();
    let result = match self.inner.transport.send(request).await {
      Ok(response) => check_status(&response).and_then(|_| envelope::check_write(&response.body)),
      Err(e) => Err(e),
    };

    // A failed write may still have landed server-side
    let dropped = self.invalidate(resource);

    match &result {
      Ok(()) => info!(?method, %path, dropped, "write succeeded"),
      Err(e) => warn!(?method, %path, error = %e, dropped, "write failed"),
    }
    result
  }

  fn cached(&self, key: &str) -> Option<ListResult> {
    let value = self.inner.cache.get(key)?;
    match serde_json::from_value(value) {
      Ok(result) => Some(result),
      Err(e) => {
        warn!(key, error = %e, "cached value is not a list result");
        None
      }
    }
  }

  async fn load(&self, resource: Resource, key: &str) -> Fetched {
    match self.single_flight(resource, key).await {
      Ok(result) => Fetched::new(result.into(), CacheSource::Network),
      Err(err) => match self.cached(key) {
        Some(result) => {
          warn!(key, error = %err, "request failed, serving cached result");
          Fetched::new(result.into(), CacheSource::Offline)
        }
        None => {
          warn!(key, error = %err, "request failed");
          Fetched::new(ListView::Error(err), CacheSource::Network)
        }
      },
    }
  }

  /// Join the in-flight request for `key`, or start one.
  fn single_flight(&self, resource: Resource, key: &str) -> SharedFetch {
    let mut in_flight = self.inner.in_flight();
    if let Some(existing) = in_flight.get(key) {
      debug!(key, "joining in-flight request");
      return existing.future.clone();
    }

    let generation = self.inner.generation(resource);
    let inner = Arc::clone(&self.inner);
    let owned_key = key.to_string();

    let future = async move {
      let result = inner.request_list(&owned_key).await;

      if inner.generation(resource) == generation {
        if let Ok(list) = &result {
          match serde_json::to_value(list) {
            Ok(value) => inner.cache.set(&owned_key, value, inner.ttl_secs),
            Err(e) => warn!(key = %owned_key, error = %e, "failed to encode list for caching"),
          }
        }
      } else {
        debug!(key = %owned_key, "cache invalidated while loading, not storing response");
      }

      let mut in_flight = inner.in_flight();
      if in_flight
        .get(&owned_key)
        .is_some_and(|f| f.generation == generation)
      {
        in_flight.remove(&owned_key);
      }

      result
    }
    .boxed()
    .shared();

    in_flight.insert(
      key.to_string(),
      InFlight {
        generation,
        future: future.clone(),
      },
    );
    future
  }
}

fn check_status(response: &RawResponse) -> Result<(), FetchError> {
  if response.is_success() {
    Ok(())
  } else {
    Err(FetchError::Status {
      status: response.status,
      message: envelope::error_message(&response.body),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::{json_response, MockTransport};
  use crate::api::transport::Method;
  use crate::cache::{ManualClock, SqliteStorage};
  use serde_json::json;
  use std::time::Duration;

  fn fetcher_with(transport: MockTransport) -> ListFetcher {
    let cache = TtlCache::new(SqliteStorage::open_in_memory().unwrap());
    ListFetcher::new(Arc::new(transport), Arc::new(cache), 300)
  }

  fn acme_query() -> QueryState {
    QueryState::new()
      .with_filter("search", "acme")
      .with_page(1)
      .with_trashed(false)
  }

  const ACME_KEY: &str = "/providers?search=acme&page=1&per_page=10&sort=newest&trashed=0";

  #[tokio::test]
  async fn test_fetch_normalizes_and_caches() {
    let transport = MockTransport::always(
      200,
      json!({"success": true, "data": [{"id": 1, "name": "Acme Care"}], "total": 1}),
    );
    let fetcher = fetcher_with(transport.clone());

    let fetched = fetcher.fetch(Resource::Providers, &acme_query()).await.unwrap();

    let expected: ListResult =
      serde_json::from_value(json!({"items": [{"id": 1, "name": "Acme Care"}], "total": 1})).unwrap();
    assert_eq!(fetched.view, ListView::Loaded(expected.clone()));
    assert_eq!(fetched.source, CacheSource::Network);
    assert_eq!(transport.calls()[0], ApiRequest::get(ACME_KEY));
    assert_eq!(
      fetcher.cache().get(ACME_KEY),
      Some(serde_json::to_value(&expected).unwrap())
    );
  }

  #[tokio::test]
  async fn test_repeat_within_ttl_uses_cache() {
    let transport = MockTransport::always(200, json!({"data": [{"id": 1}], "total": 1}));
    let fetcher = fetcher_with(transport.clone());

    let first = fetcher.fetch(Resource::Providers, &acme_query()).await.unwrap();
    let second = fetcher.fetch(Resource::Providers, &acme_query()).await.unwrap();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(first.view, second.view);
    assert_eq!(second.source, CacheSource::Cache);
  }

  #[tokio::test]
  async fn test_expired_cache_goes_back_to_network() {
    let transport = MockTransport::always(200, json!({"data": [{"id": 1}]}));
    let clock = Arc::new(ManualClock::new());
    let cache = TtlCache::new(SqliteStorage::open_in_memory().unwrap()).with_clock(clock.clone());
    let fetcher = ListFetcher::new(Arc::new(transport.clone()), Arc::new(cache), 60);

    fetcher.fetch(Resource::Reviews, &QueryState::new()).await.unwrap();
    clock.advance(60);
    let fetched = fetcher.fetch(Resource::Reviews, &QueryState::new()).await.unwrap();

    assert_eq!(transport.call_count(), 2);
    assert_eq!(fetched.source, CacheSource::Network);
  }

  #[tokio::test]
  async fn test_concurrent_identical_requests_share_one_call() {
    let transport = MockTransport::new(|_| {
      (
        Duration::from_millis(50),
        Ok(json_response(200, &json!({"data": [{"id": 9}]}))),
      )
    });
    let fetcher = fetcher_with(transport.clone());
    let q = QueryState::new();

    let (a, b, c) = tokio::join!(
      fetcher.fetch(Resource::Clients, &q),
      fetcher.fetch(Resource::Clients, &q),
      fetcher.fetch(Resource::Clients, &q),
    );

    assert_eq!(transport.call_count(), 1);
    assert_eq!(a.unwrap().view, b.as_ref().unwrap().view);
    assert_eq!(b.unwrap().view, c.unwrap().view);
  }

  #[tokio::test]
  async fn test_network_error_without_cache_is_error_view() {
    let transport = MockTransport::new(|_| (Duration::ZERO, Err(FetchError::Network("refused".into()))));
    let fetcher = fetcher_with(transport);

    let fetched = fetcher.fetch(Resource::Providers, &QueryState::new()).await.unwrap();
    assert_eq!(
      fetched.view,
      ListView::Error(FetchError::Network("refused".into()))
    );
  }

  #[tokio::test]
  async fn test_refresh_failure_falls_back_to_fresh_cache() {
    let transport = MockTransport::new(|_| (Duration::ZERO, Err(FetchError::Network("offline".into()))));
    let fetcher = fetcher_with(transport.clone());
    let q = QueryState::new();
    let key = q.cache_key(Resource::Providers).unwrap();
    fetcher.cache().set(
      &key,
      json!({"items": [{"id": 5, "name": "Zorg B.V."}], "total": 1}),
      300,
    );

    let fetched = fetcher.refresh(Resource::Providers, &q).await.unwrap();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(fetched.source, CacheSource::Offline);
    assert_eq!(fetched.view.total(), 1);
  }

  #[tokio::test]
  async fn test_http_error_status() {
    let transport = MockTransport::always(403, json!({"code": "rest_cookie_invalid_nonce", "message": "Cookie check failed"}));
    let fetcher = fetcher_with(transport);

    let fetched = fetcher.fetch(Resource::Clients, &QueryState::new()).await.unwrap();
    assert_eq!(
      fetched.view,
      ListView::Error(FetchError::Status {
        status: 403,
        message: Some("Cookie check failed".to_string())
      })
    );
  }

  #[tokio::test]
  async fn test_malformed_response_is_not_cached() {
    let transport = MockTransport::always(200, json!({"data": {"rows": []}}));
    let fetcher = fetcher_with(transport.clone());
    let q = QueryState::new();

    let fetched = fetcher.fetch(Resource::Reviews, &q).await.unwrap();
    assert!(matches!(fetched.view, ListView::Error(FetchError::MalformedResponse(_))));
    assert_eq!(fetcher.peek(Resource::Reviews, &q).unwrap(), None);
  }

  #[tokio::test]
  async fn test_empty_list_is_empty_view() {
    let transport = MockTransport::always(200, json!({"success": true, "data": [], "total": 0}));
    let fetcher = fetcher_with(transport);

    let fetched = fetcher.fetch(Resource::Favourites, &QueryState::new()).await.unwrap();
    assert_eq!(fetched.view, ListView::Empty);
  }

  #[tokio::test]
  async fn test_invalid_query_is_returned_as_error() {
    let transport = MockTransport::always(200, json!({"data": []}));
    let fetcher = fetcher_with(transport.clone());
    let q = QueryState::new().with_filter("search", json!(["a"]));

    let err = fetcher.fetch(Resource::Providers, &q).await.unwrap_err();
    assert_eq!(
      err,
      QueryError::InvalidQueryValue {
        key: "search".to_string()
      }
    );
    assert_eq!(transport.call_count(), 0);
  }

  #[tokio::test]
  async fn test_delete_invalidates_every_page_of_the_resource() {
    let transport = MockTransport::new(|req| {
      let body = match req.method {
        Method::Get => json!({"data": [{"id": 1}, {"id": 2}], "total": 2}),
        _ => json!({"success": true}),
      };
      (Duration::ZERO, Ok(json_response(200, &body)))
    });
    let fetcher = fetcher_with(transport.clone());

    let page1 = QueryState::new();
    let page2 = QueryState::new().with_page(2).with_filter("city", "Delft");
    let reviews = QueryState::new();
    fetcher.fetch(Resource::Providers, &page1).await.unwrap();
    fetcher.fetch(Resource::Providers, &page2).await.unwrap();
    fetcher.fetch(Resource::Reviews, &reviews).await.unwrap();
    assert_eq!(transport.call_count(), 3);

    fetcher.delete_item(Resource::Providers, 1).await.unwrap();

    assert_eq!(transport.calls()[3], ApiRequest::delete("/providers/1"));
    assert_eq!(fetcher.peek(Resource::Providers, &page1).unwrap(), None);
    assert_eq!(fetcher.peek(Resource::Providers, &page2).unwrap(), None);
    assert!(fetcher.peek(Resource::Reviews, &reviews).unwrap().is_some());

    let fetched = fetcher.fetch(Resource::Providers, &page1).await.unwrap();
    assert_eq!(fetched.source, CacheSource::Network);
    assert_eq!(transport.call_count(), 5);
  }

  #[tokio::test]
  async fn test_restore_and_patch_requests() {
    let transport = MockTransport::always(200, json!({"success": true}));
    let fetcher = fetcher_with(transport.clone());

    fetcher.restore_item(Resource::Reviews, 4).await.unwrap();
    fetcher
      .patch_item(Resource::Reviews, 4, json!({"status": "approved"}))
      .await
      .unwrap();

    assert_eq!(
      transport.calls(),
      vec![
        ApiRequest::patch("/reviews/4/restore", None),
        ApiRequest::patch("/reviews/4", Some(json!({"status": "approved"}))),
      ]
    );
  }

  #[tokio::test]
  async fn test_failed_write_still_invalidates() {
    let transport = MockTransport::new(|req| match req.method {
      Method::Get => (Duration::ZERO, Ok(json_response(200, &json!({"data": [{"id": 1}]})))),
      _ => (
        Duration::ZERO,
        Ok(json_response(200, &json!({"success": false, "message": "Not allowed"}))),
      ),
    });
    let fetcher = fetcher_with(transport);
    let q = QueryState::new();
    fetcher.fetch(Resource::Appointments, &q).await.unwrap();

    let err = fetcher.delete_item(Resource::Appointments, 1).await.unwrap_err();

    assert_eq!(err, FetchError::Api("Not allowed".to_string()));
    assert_eq!(fetcher.peek(Resource::Appointments, &q).unwrap(), None);
  }

  #[tokio::test]
  async fn test_response_started_before_invalidation_is_not_cached() {
    let transport = MockTransport::new(|_| {
      (
        Duration::from_millis(50),
        Ok(json_response(200, &json!({"data": [{"id": 1}]}))),
      )
    });
    let fetcher = fetcher_with(transport);
    let q = QueryState::new();

    let pending = {
      let fetcher = fetcher.clone();
      let q = q.clone();
      tokio::spawn(async move { fetcher.fetch(Resource::Providers, &q).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    fetcher.invalidate(Resource::Providers);

    let fetched = pending.await.unwrap().unwrap();
    assert_eq!(fetched.view.total(), 1);
    assert_eq!(fetcher.peek(Resource::Providers, &q).unwrap(), None);
  }

  #[tokio::test]
  async fn test_invalidating_one_resource_keeps_others_cacheable() {
    let transport = MockTransport::new(|_| {
      (
        Duration::from_millis(50),
        Ok(json_response(200, &json!({"data": [{"id": 1}]}))),
      )
    });
    let fetcher = fetcher_with(transport.clone());
    let q = QueryState::new();

    let pending = {
      let fetcher = fetcher.clone();
      let q = q.clone();
      tokio::spawn(async move { fetcher.fetch(Resource::Providers, &q).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    fetcher.invalidate(Resource::Reviews);

    pending.await.unwrap().unwrap();
    assert!(fetcher.peek(Resource::Providers, &q).unwrap().is_some());

    let again = fetcher.fetch(Resource::Providers, &q).await.unwrap();
    assert_eq!(again.source, CacheSource::Cache);
    assert_eq!(transport.call_count(), 1);
  }
}
