use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::Resource;

/// Errors raised while turning a query state into a query string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
  /// A filter held an array or object. Stringifying those would let
  /// different logical queries share one cache key.
  #[error("filter '{key}' must be a string, number or boolean")]
  InvalidQueryValue { key: String },
}

/// Allowed page sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerPage {
  #[default]
  Ten,
  Twenty,
  Fifty,
  Hundred,
}

impl PerPage {
  pub fn get(&self) -> u32 {
    match self {
      PerPage::Ten => 10,
      PerPage::Twenty => 20,
      PerPage::Fifty => 50,
      PerPage::Hundred => 100,
    }
  }

  /// Next larger size, wrapping around to the smallest
  pub fn next(&self) -> Self {
    match self {
      PerPage::Ten => PerPage::Twenty,
      PerPage::Twenty => PerPage::Fifty,
      PerPage::Fifty => PerPage::Hundred,
      PerPage::Hundred => PerPage::Ten,
    }
  }
}

impl TryFrom<u32> for PerPage {
  type Error = String;

  fn try_from(n: u32) -> Result<Self, Self::Error> {
    match n {
      10 => Ok(PerPage::Ten),
      20 => Ok(PerPage::Twenty),
      50 => Ok(PerPage::Fifty),
      100 => Ok(PerPage::Hundred),
      _ => Err(format!("page size must be one of 10, 20, 50, 100 (got {})", n)),
    }
  }
}

impl FromStr for PerPage {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let n: u32 = s
      .trim()
      .parse()
      .map_err(|_| format!("invalid page size '{}'", s))?;
    PerPage::try_from(n)
  }
}

/// Sort tokens understood by the list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
  #[default]
  Newest,
  Oldest,
  NameAsc,
  NameDesc,
  Rating,
}

impl SortOrder {
  pub fn as_str(&self) -> &'static str {
    match self {
      SortOrder::Newest => "newest",
      SortOrder::Oldest => "oldest",
      SortOrder::NameAsc => "name_asc",
      SortOrder::NameDesc => "name_desc",
      SortOrder::Rating => "rating",
    }
  }

  pub fn next(&self) -> Self {
    match self {
      SortOrder::Newest => SortOrder::Oldest,
      SortOrder::Oldest => SortOrder::NameAsc,
      SortOrder::NameAsc => SortOrder::NameDesc,
      SortOrder::NameDesc => SortOrder::Rating,
      SortOrder::Rating => SortOrder::Newest,
    }
  }
}

impl fmt::Display for SortOrder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SortOrder {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim() {
      "newest" => Ok(SortOrder::Newest),
      "oldest" => Ok(SortOrder::Oldest),
      "name_asc" => Ok(SortOrder::NameAsc),
      "name_desc" => Ok(SortOrder::NameDesc),
      "rating" => Ok(SortOrder::Rating),
      other => Err(format!(
        "unknown sort '{}', expected newest, oldest, name_asc, name_desc or rating",
        other
      )),
    }
  }
}

/// Filter, sort and paging state of one list page.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
  filters: HashMap<String, Value>,
  pub page: u32,
  pub per_page: PerPage,
  pub sort: SortOrder,
  pub trashed: bool,
}

impl Default for QueryState {
  fn default() -> Self {
    Self {
      filters: HashMap::new(),
      page: 1,
      per_page: PerPage::default(),
      sort: SortOrder::default(),
      trashed: false,
    }
  }
}

impl QueryState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.set_filter(key, value);
    self
  }

  pub fn with_page(mut self, page: u32) -> Self {
    self.set_page(page);
    self
  }

  pub fn with_per_page(mut self, per_page: PerPage) -> Self {
    self.per_page = per_page;
    self
  }

  pub fn with_sort(mut self, sort: SortOrder) -> Self {
    self.sort = sort;
    self
  }

  pub fn with_trashed(mut self, trashed: bool) -> Self {
    self.trashed = trashed;
    self
  }

  /// Set a filter value. Setting a filter resets paging to the first page.
  pub fn set_filter(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.filters.insert(key.into(), value.into());
    self.page = 1;
  }

  pub fn filter(&self, key: &str) -> Option<&Value> {
    self.filters.get(key)
  }

  /// Page numbers start at 1; zero is clamped.
  pub fn set_page(&mut self, page: u32) {
    self.page = page.max(1);
  }

  /// Serialize into a query string for `resource`.
  ///
  /// Declared filters come first in the resource's order, followed by
  /// `page`, `per_page`, `sort` and `trashed`, which are always present.
  pub fn serialize(&self, resource: Resource) -> Result<String, QueryError> {
    let declared = resource.filters();
    for key in self.filters.keys() {
      if !declared.contains(&key.as_str()) {
        debug!(resource = %resource, key = %key, "ignoring undeclared filter");
      }
    }

    let mut out = url::form_urlencoded::Serializer::new(String::new());
    for key in declared {
      let Some(value) = self.filters.get(*key) else {
        continue;
      };
      if let Some(param) = param_value(key, value)? {
        out.append_pair(key, &param);
      }
    }

    out.append_pair("page", &self.page.max(1).to_string());
    out.append_pair("per_page", &self.per_page.get().to_string());
    out.append_pair("sort", self.sort.as_str());
    out.append_pair("trashed", if self.trashed { "1" } else { "0" });

    Ok(out.finish())
  }

  /// Cache key for this query: `<path>?<query string>`.
  pub fn cache_key(&self, resource: Resource) -> Result<String, QueryError> {
    Ok(format!("{}?{}", resource.path(), self.serialize(resource)?))
  }
}

/// Render one filter value, or `None` when it should be left out.
fn param_value(key: &str, value: &Value) -> Result<Option<String>, QueryError> {
  match value {
    Value::Null => Ok(None),
    Value::String(s) if s.is_empty() => Ok(None),
    Value::String(s) => Ok(Some(s.clone())),
    Value::Number(n) => Ok(Some(n.to_string())),
    Value::Bool(b) => Ok(Some(if *b { "1" } else { "0" }.to_string())),
    Value::Array(_) | Value::Object(_) => Err(QueryError::InvalidQueryValue {
      key: key.to_string(),
    }),
  }
}
