use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::listing::PerPage;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub site: SiteConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub http: HttpConfig,
  #[serde(default)]
  pub list: ListConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
  /// WordPress site root, e.g. https://zorgfinder.example.nl
  pub url: String,
  /// REST namespace of the plugin routes
  #[serde(default = "default_namespace")]
  pub namespace: String,
}

fn default_namespace() -> String {
  "zorg/v1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Disable to keep responses in memory only
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// How long a list response stays fresh
  #[serde(default = "default_ttl")]
  pub ttl_secs: u64,
  /// Database location (defaults to a per-site file in the data directory)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      ttl_secs: default_ttl(),
      path: None,
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_ttl() -> u64 {
  300
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
  #[serde(default = "default_timeout")]
  pub timeout_secs: u64,
  /// Header carrying the nonce
  #[serde(default = "default_nonce_header")]
  pub nonce_header: String,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout(),
      nonce_header: default_nonce_header(),
    }
  }
}

fn default_timeout() -> u64 {
  30
}

fn default_nonce_header() -> String {
  "X-Auth-Nonce".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListConfig {
  /// Default page size (10, 20, 50 or 100)
  #[serde(default, deserialize_with = "deserialize_per_page")]
  pub per_page: PerPage,
}

fn deserialize_per_page<'de, D>(deserializer: D) -> Result<PerPage, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let n = u32::deserialize(deserializer)?;
  PerPage::try_from(n).map_err(serde::de::Error::custom)
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./zorg.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/zorg/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/zorg/config.yaml\n\
                 with at least:\n\n  site:\n    url: https://your-site.example"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("zorg.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("zorg").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.site.url.trim().is_empty() {
      return Err(eyre!("site.url must not be empty"));
    }
    Ok(config)
  }

  /// Root of the plugin's REST routes: `<site>/wp-json/<namespace>`.
  pub fn api_base(&self) -> String {
    format!(
      "{}/wp-json/{}",
      self.site.url.trim_end_matches('/'),
      self.site.namespace.trim_matches('/')
    )
  }

  /// Where the response cache lives.
  ///
  /// Each site gets its own database so switching sites never serves
  /// another site's rows.
  pub fn cache_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.cache.path {
      return Ok(path.clone());
    }

    let mut hasher = Sha256::new();
    hasher.update(self.api_base().as_bytes());
    let digest = hex::encode(hasher.finalize());

    Ok(data_dir()?.join(format!("cache-{}.db", &digest[..12])))
  }

  /// Get the request nonce from environment variables.
  ///
  /// Checks ZORG_NONCE first, then WP_NONCE as fallback. Public endpoints
  /// work without one.
  pub fn get_nonce() -> Option<String> {
    std::env::var("ZORG_NONCE")
      .or_else(|_| std::env::var("WP_NONCE"))
      .ok()
      .filter(|n| !n.trim().is_empty())
  }
}

/// Application data directory, e.g. ~/.local/share/zorg
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("zorg"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml("site:\n  url: https://zorg.example.nl/\n").unwrap();

    assert_eq!(config.site.namespace, "zorg/v1");
    assert!(config.cache.enabled);
    assert_eq!(config.cache.ttl_secs, 300);
    assert_eq!(config.http.timeout_secs, 30);
    assert_eq!(config.http.nonce_header, "X-Auth-Nonce");
    assert_eq!(config.list.per_page, PerPage::Ten);
    assert_eq!(config.api_base(), "https://zorg.example.nl/wp-json/zorg/v1");
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
site:
  url: http://localhost:8080
  namespace: /zorg/v2/
cache:
  enabled: false
  ttl_secs: 60
  path: /tmp/zorg.db
http:
  timeout_secs: 5
  nonce_header: X-WP-Nonce
list:
  per_page: 50
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert!(!config.cache.enabled);
    assert_eq!(config.cache.ttl_secs, 60);
    assert_eq!(config.cache_path().unwrap(), PathBuf::from("/tmp/zorg.db"));
    assert_eq!(config.http.nonce_header, "X-WP-Nonce");
    assert_eq!(config.list.per_page, PerPage::Fifty);
    assert_eq!(config.api_base(), "http://localhost:8080/wp-json/zorg/v2");
  }

  #[test]
  fn test_invalid_page_size_is_rejected() {
    let yaml = "site:\n  url: https://a.nl\nlist:\n  per_page: 15\n";
    assert!(Config::from_yaml(yaml).is_err());
  }

  #[test]
  fn test_empty_url_is_rejected() {
    assert!(Config::from_yaml("site:\n  url: ''\n").is_err());
  }

  #[test]
  fn test_cache_path_differs_per_site() {
    let a = Config::from_yaml("site:\n  url: https://a.nl\n").unwrap();
    let b = Config::from_yaml("site:\n  url: https://b.nl\n").unwrap();

    let (Ok(pa), Ok(pb)) = (a.cache_path(), b.cache_path()) else {
      // No home/data directory in this environment
      return;
    };
    assert_ne!(pa, pb);
    assert!(pa.file_name().unwrap().to_string_lossy().starts_with("cache-"));
  }
}
