//! Serde types for the API's response envelopes.
//!
//! List endpoints answer `{success, data, total?, message?}`, but not
//! consistently: some put the rows straight into `data`, others wrap them
//! again as `{data: {data: [...], total}}`. Everything is normalized into a
//! [`ListResult`] here so nothing past this module sees either shape.

use serde::Deserialize;
use serde_json::Value;

use super::types::{FetchError, ListResult, Record};

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
  success: Option<bool>,
  #[serde(default)]
  data: Value,
  total: Option<Value>,
  message: Option<String>,
}

/// Error body WordPress returns for failed REST requests
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
  message: Option<String>,
}

/// Parse a list response body.
pub fn parse_list(body: &[u8]) -> Result<ListResult, FetchError> {
  let envelope: ApiEnvelope = serde_json::from_slice(body)
    .map_err(|e| FetchError::MalformedResponse(format!("invalid JSON: {}", e)))?;

  if envelope.success == Some(false) {
    return Err(FetchError::Api(
      envelope
        .message
        .unwrap_or_else(|| "request failed".to_string()),
    ));
  }

  match envelope.data {
    // Flat: {data: [...], total}
    Value::Array(rows) => {
      let items = into_records(rows)?;
      let total = envelope
        .total
        .as_ref()
        .and_then(parse_total)
        .unwrap_or(items.len() as u64);
      Ok(ListResult::new(items, total))
    }
    // Nested: {data: {data: [...], total}}
    Value::Object(mut inner) => match inner.remove("data") {
      Some(Value::Array(rows)) => {
        let items = into_records(rows)?;
        let total = inner
          .get("total")
          .and_then(parse_total)
          .or_else(|| envelope.total.as_ref().and_then(parse_total))
          .unwrap_or(items.len() as u64);
        Ok(ListResult::new(items, total))
      }
      _ => Err(FetchError::MalformedResponse(
        "object payload without a data array".to_string(),
      )),
    },
    other => Err(FetchError::MalformedResponse(format!(
      "unexpected payload type: {}",
      value_kind(&other)
    ))),
  }
}

/// Check the envelope of a write (delete/restore/patch) response.
///
/// Empty bodies are accepted; WordPress sends nothing for some deletes.
pub fn check_write(body: &[u8]) -> Result<(), FetchError> {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(());
  }

  match serde_json::from_slice::<ApiEnvelope>(body) {
    Ok(envelope) if envelope.success == Some(false) => Err(FetchError::Api(
      envelope
        .message
        .unwrap_or_else(|| "request failed".to_string()),
    )),
    Ok(_) => Ok(()),
    // Some handlers answer with a bare `true` or the updated row
    Err(_) if serde_json::from_slice::<Value>(body).is_ok() => Ok(()),
    Err(e) => Err(FetchError::MalformedResponse(format!("invalid JSON: {}", e))),
  }
}

/// Pull a human readable message out of an error response body.
pub fn error_message(body: &[u8]) -> Option<String> {
  serde_json::from_slice::<ApiErrorBody>(body)
    .ok()
    .and_then(|b| b.message)
    .filter(|m| !m.is_empty())
}

fn into_records(rows: Vec<Value>) -> Result<Vec<Record>, FetchError> {
  rows
    .into_iter()
    .enumerate()
    .map(|(i, row)| match row {
      Value::Object(record) => Ok(record),
      other => Err(FetchError::MalformedResponse(format!(
        "row {} is a {}, expected an object",
        i,
        value_kind(&other)
      ))),
    })
    .collect()
}

/// Totals arrive as numbers or numeric strings
fn parse_total(value: &Value) -> Option<u64> {
  match value {
    Value::Number(n) => n.as_u64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn value_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
