//! Scripted transport standing in for the server in tests.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::transport::{ApiRequest, RawResponse, Transport};
use super::types::FetchError;

pub type Reply = (Duration, Result<RawResponse, FetchError>);
type Handler = Box<dyn Fn(&ApiRequest) -> Reply + Send + Sync>;

/// Transport that answers from a handler closure and records every request.
#[derive(Clone)]
pub struct MockTransport {
  handler: Arc<Handler>,
  calls: Arc<Mutex<Vec<ApiRequest>>>,
}

impl MockTransport {
  pub fn new(handler: impl Fn(&ApiRequest) -> Reply + Send + Sync + 'static) -> Self {
    Self {
      handler: Arc::new(Box::new(handler)),
      calls: Arc::new(Mutex::new(Vec::new())),
    }
  }

  /// Answer every request with the same JSON body.
  pub fn always(status: u16, body: Value) -> Self {
    Self::new(move |_| (Duration::ZERO, Ok(json_response(status, &body))))
  }

  pub fn calls(&self) -> Vec<ApiRequest> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

impl Transport for MockTransport {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<RawResponse, FetchError>> {
    let (delay, reply) = (self.handler)(&request);
    self.calls.lock().unwrap().push(request);

    async move {
      if !delay.is_zero() {
        tokio::time::sleep(delay).await;
      }
      reply
    }
    .boxed()
  }
}

pub fn json_response(status: u16, body: &Value) -> RawResponse {
  RawResponse {
    status,
    body: serde_json::to_vec(body).unwrap(),
  }
}
