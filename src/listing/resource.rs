use std::fmt;
use std::str::FromStr;

/// A list endpoint of the `zorg/v1` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
  Providers,
  Reviews,
  Appointments,
  Favourites,
  Reimbursements,
  Clients,
}

impl Resource {
  pub const ALL: [Resource; 6] = [
    Resource::Providers,
    Resource::Reviews,
    Resource::Appointments,
    Resource::Favourites,
    Resource::Reimbursements,
    Resource::Clients,
  ];

  /// Path below the REST namespace, e.g. `/providers`
  pub fn path(&self) -> &'static str {
    match self {
      Resource::Providers => "/providers",
      Resource::Reviews => "/reviews",
      Resource::Appointments => "/appointments",
      Resource::Favourites => "/favourites",
      Resource::Reimbursements => "/reimbursements",
      Resource::Clients => "/clients",
    }
  }

  /// Filter keys this endpoint accepts, in serialization order.
  ///
  /// The order here, not the order the caller set them in, decides the
  /// layout of the query string.
  pub fn filters(&self) -> &'static [&'static str] {
    match self {
      Resource::Providers => &["search", "type_of_care", "city", "reimbursement"],
      Resource::Reviews => &["search", "provider_id", "rating", "status"],
      Resource::Appointments => &["search", "provider_id", "status", "date_from", "date_to"],
      Resource::Favourites => &["search", "user_id", "provider_id"],
      Resource::Reimbursements => &["search", "insurer", "policy", "provider_id"],
      Resource::Clients => &["search", "email", "role"],
    }
  }

  /// Record fields shown as table columns
  pub fn columns(&self) -> &'static [&'static str] {
    match self {
      Resource::Providers => &["id", "name", "type_of_care", "city"],
      Resource::Reviews => &["id", "provider", "rating", "status"],
      Resource::Appointments => &["id", "provider", "date", "status"],
      Resource::Favourites => &["id", "user", "provider"],
      Resource::Reimbursements => &["id", "insurer", "policy", "percentage"],
      Resource::Clients => &["id", "name", "email", "role"],
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Resource::Providers => "Providers",
      Resource::Reviews => "Reviews",
      Resource::Appointments => "Appointments",
      Resource::Favourites => "Favourites",
      Resource::Reimbursements => "Reimbursements",
      Resource::Clients => "Clients",
    }
  }

  /// Whether a cache key belongs to this endpoint, regardless of its query.
  pub fn owns_key(&self, key: &str) -> bool {
    match key.strip_prefix(self.path()) {
      Some(rest) => rest.is_empty() || rest.starts_with('?') || rest.starts_with('/'),
      None => false,
    }
  }
}

impl fmt::Display for Resource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.path()[1..])
  }
}

impl FromStr for Resource {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let name = s.trim().trim_start_matches('/').to_lowercase();
    match name.as_str() {
      "providers" | "provider" | "p" => Ok(Resource::Providers),
      "reviews" | "review" => Ok(Resource::Reviews),
      "appointments" | "appointment" | "a" => Ok(Resource::Appointments),
      // Both spellings show up in the plugin's routes
      "favourites" | "favorites" | "favourite" | "favorite" | "f" => Ok(Resource::Favourites),
      "reimbursements" | "reimbursement" => Ok(Resource::Reimbursements),
      "clients" | "client" | "c" => Ok(Resource::Clients),
      _ => Err(format!(
        "unknown resource '{}', expected one of: {}",
        s,
        Resource::ALL
          .iter()
          .map(|r| r.to_string())
          .collect::<Vec<_>>()
          .join(", ")
      )),
    }
  }
}
