//! Configuration loader and validator for the RequestDesk sync service.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::error::SyncError;

/// Production endpoint used when `requestdesk.endpoint_url` is left blank.
pub const DEFAULT_ENDPOINT_URL: &str = "https://app.requestdesk.ai";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub requestdesk: RequestDesk,
    pub store: Store,
    #[serde(default)]
    pub cron: Cron,
    #[serde(default)]
    pub server: Server,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Remote API credentials and call limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestDesk {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_test_timeout_seconds")]
    pub test_timeout_seconds: u64,
}

/// The local store this instance represents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Store {
    pub id: i64,
    pub code: String,
    pub name: String,
    /// Base URL with a trailing slash, e.g. `https://shop.example.com/`.
    pub base_url: String,
    /// Media base URL; defaults to `{base_url}media/`.
    #[serde(default)]
    pub media_url: Option<String>,
}

/// Scheduled import settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cron {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub status: Option<String>,
    pub sync_status: Option<String>,
    pub per_page: u32,
}

impl Default for Cron {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 300,
            status: Some("publish".into()),
            sync_status: Some("not_synced".into()),
            per_page: 50,
        }
    }
}

/// Inbound HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub bind: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
        }
    }
}

fn default_endpoint_url() -> String {
    DEFAULT_ENDPOINT_URL.into()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_test_timeout_seconds() -> u64 {
    10
}

/// Resolved credentials for talking to RequestDesk. Only obtainable through
/// [`Config::credentials`], which fails fast when anything is missing.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub endpoint: Url,
    pub timeout: Duration,
    pub test_timeout: Duration,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Store facts shared by transformers, reports and API responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreContext {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub base_url: String,
    pub media_url: String,
}

impl StoreContext {
    /// Host of the base URL, used as the store identifier on the remote side.
    pub fn identifier(&self) -> String {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "magento-store".to_string())
    }

    /// Base URL without its trailing slash.
    pub fn trimmed_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Default SQLite URL inside the data directory.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "sqlite://{}/requestdesk.db?mode=rwc",
                self.app.data_dir.trim_end_matches('/')
            )
        })
    }

    /// API key with the `REQUESTDESK_API_KEY` environment override applied.
    pub fn api_key(&self) -> Option<String> {
        std::env::var("REQUESTDESK_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| Some(self.requestdesk.api_key.clone()))
            .filter(|k| !k.trim().is_empty())
    }

    /// Resolve credentials for outbound calls. Missing key or endpoint is a
    /// configuration error raised before any network activity.
    pub fn credentials(&self) -> Result<Credentials, SyncError> {
        let api_key = self.api_key().ok_or_else(|| {
            SyncError::Configuration(
                "RequestDesk API not configured: set requestdesk.api_key".into(),
            )
        })?;
        let raw = self.requestdesk.endpoint_url.trim();
        if raw.is_empty() {
            return Err(SyncError::Configuration(
                "RequestDesk API not configured: set requestdesk.endpoint_url".into(),
            ));
        }
        // Url::join drops the last path segment unless the base ends in '/'.
        let normalized = format!("{}/", raw.trim_end_matches('/'));
        let endpoint = Url::parse(&normalized).map_err(|e| {
            SyncError::Configuration(format!("invalid requestdesk.endpoint_url '{}': {}", raw, e))
        })?;
        Ok(Credentials {
            api_key,
            endpoint,
            timeout: Duration::from_secs(self.requestdesk.timeout_seconds),
            test_timeout: Duration::from_secs(self.requestdesk.test_timeout_seconds),
        })
    }

    pub fn store_context(&self) -> StoreContext {
        let base_url = format!("{}/", self.store.base_url.trim_end_matches('/'));
        let media_url = self
            .store
            .media_url
            .clone()
            .filter(|m| !m.trim().is_empty())
            .map(|m| format!("{}/", m.trim_end_matches('/')))
            .unwrap_or_else(|| format!("{}media/", base_url));
        StoreContext {
            id: self.store.id,
            code: self.store.code.clone(),
            name: self.store.name.clone(),
            base_url,
            media_url,
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
///
/// The API key is not required here; its absence surfaces as
/// `SyncError::Configuration` at call time.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.requestdesk.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("requestdesk.timeout_seconds must be > 0"));
    }
    if cfg.requestdesk.test_timeout_seconds == 0 {
        return Err(ConfigError::Invalid(
            "requestdesk.test_timeout_seconds must be > 0",
        ));
    }
    if cfg.store.id < 0 {
        return Err(ConfigError::Invalid("store.id must be >= 0"));
    }
    if cfg.store.code.trim().is_empty() {
        return Err(ConfigError::Invalid("store.code must be non-empty"));
    }
    if Url::parse(cfg.store.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("store.base_url must be an absolute URL"));
    }
    if cfg.cron.enabled && cfg.cron.interval_seconds == 0 {
        return Err(ConfigError::Invalid("cron.interval_seconds must be > 0"));
    }
    if cfg.cron.per_page == 0 {
        return Err(ConfigError::Invalid("cron.per_page must be > 0"));
    }
    if cfg.server.bind.trim().is_empty() {
        return Err(ConfigError::Invalid("server.bind must be non-empty"));
    }
    Ok(())
}

/// Returns the example YAML shipped with the service.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

requestdesk:
  api_key: "YOUR_REQUESTDESK_API_KEY"
  endpoint_url: "https://app.requestdesk.ai"
  timeout_seconds: 30
  test_timeout_seconds: 10

store:
  id: 1
  code: "default"
  name: "Main Website Store"
  base_url: "https://shop.example.com/"

cron:
  enabled: true
  interval_seconds: 300
  status: "publish"
  sync_status: "not_synced"
  per_page: 50

server:
  bind: "127.0.0.1:8080"
"#
}
