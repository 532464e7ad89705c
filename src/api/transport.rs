use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::types::FetchError;
use crate::config::Config;

/// HTTP verbs the client uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Delete,
  Patch,
}

/// A request relative to the REST namespace root.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  /// Path plus query, e.g. `/providers?page=1&per_page=10&sort=newest&trashed=0`
  pub path: String,
  pub body: Option<Value>,
}

impl ApiRequest {
  pub fn get(path: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      path: path.into(),
      body: None,
    }
  }

  pub fn delete(path: impl Into<String>) -> Self {
    Self {
      method: Method::Delete,
      path: path.into(),
      body: None,
    }
  }

  pub fn patch(path: impl Into<String>, body: Option<Value>) -> Self {
    Self {
      method: Method::Patch,
      path: path.into(),
      body,
    }
  }
}

/// Status and body of a completed request
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl RawResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Something that can carry an [`ApiRequest`] to the server.
///
/// Returned futures own everything they need so they can be spawned or
/// shared between callers.
pub trait Transport: Send + Sync {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<RawResponse, FetchError>>;
}

/// reqwest-backed transport with nonce authentication.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  /// `<site>/wp-json/<namespace>` without trailing slash
  base_url: String,
}

impl HttpTransport {
  pub fn new(config: &Config) -> Result<Self> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    match Config::get_nonce() {
      Some(nonce) => {
        let name = HeaderName::from_bytes(config.http.nonce_header.as_bytes())
          .map_err(|e| eyre!("Invalid nonce header '{}': {}", config.http.nonce_header, e))?;
        let mut value =
          HeaderValue::from_str(&nonce).map_err(|e| eyre!("Invalid nonce value: {}", e))?;
        value.set_sensitive(true);
        headers.insert(name, value);
      }
      None => debug!("no nonce configured, requests are unauthenticated"),
    }

    let client = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(Duration::from_secs(config.http.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url: config.api_base(),
    })
  }
}

impl Transport for HttpTransport {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<RawResponse, FetchError>> {
    let client = self.client.clone();
    let url = format!("{}{}", self.base_url, request.path);

    async move {
      let method = match request.method {
        Method::Get => reqwest::Method::GET,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
      };
      debug!(%method, %url, "sending request");

      let mut builder = client.request(method, &url);
      if let Some(body) = &request.body {
        let bytes = serde_json::to_vec(body)
          .map_err(|e| FetchError::Network(format!("failed to encode body: {}", e)))?;
        builder = builder.body(bytes);
      }

      let response = builder.send().await.map_err(network_error)?;
      let status = response.status().as_u16();
      let body = response.bytes().await.map_err(network_error)?.to_vec();

      Ok(RawResponse { status, body })
    }
    .boxed()
  }
}

fn network_error(e: reqwest::Error) -> FetchError {
  if e.is_timeout() {
    FetchError::Network("request timed out".to_string())
  } else {
    FetchError::Network(e.to_string())
  }
}
