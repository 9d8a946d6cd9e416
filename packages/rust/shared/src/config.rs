//! Application configuration for pagesmith.
//!
//! The project config lives at `./pagesmith.toml`, falling back to
//! `~/.pagesmith/pagesmith.toml`. CLI flags override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PagesmithError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pagesmith.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pagesmith";

// ---------------------------------------------------------------------------
// Config structs (matching pagesmith.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Names of the remote database properties.
    #[serde(default)]
    pub properties: PropertyNames,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub build: BuildSection,
}

/// `[remote]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// API origin.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Value sent in the API version header.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Database holding the posts.
    #[serde(default)]
    pub database_id: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Page size requested from list endpoints (max 100).
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            api_key_env: default_api_key_env(),
            database_id: String::new(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.notion.com".into()
}
fn default_api_version() -> String {
    "2022-06-28".into()
}
fn default_api_key_env() -> String {
    "NOTION_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_page_size() -> u32 {
    100
}

/// `[properties]` section: remote property name for each post field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyNames {
    pub title: String,
    pub slug: String,
    pub status: String,
    pub category: String,
    pub tags: String,
    pub publish_date: String,
    pub excerpt: String,
    pub featured: String,
    pub cover: String,
    pub author: String,
    pub canonical_url: String,
    pub order: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            title: "Title".into(),
            slug: "Slug".into(),
            status: "Status".into(),
            category: "Category".into(),
            tags: "Tags".into(),
            publish_date: "Publish Date".into(),
            excerpt: "Excerpt".into(),
            featured: "Featured".into(),
            cover: "Cover".into(),
            author: "Author".into(),
            canonical_url: "Canonical URL".into(),
            order: "Order".into(),
        }
    }
}

/// `[rate_limit]` section: fixed window of `max_requests` per `window_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_max_requests() -> u32 {
    3
}
fn default_window_secs() -> u64 {
    60
}

/// `[retry]` section: exponential backoff parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    10_000
}

/// `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    /// Root of the local content store.
    #[serde(default = "default_content_dir")]
    pub content_dir: String,

    /// Maximum posts processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_content_dir() -> String {
    "content".into()
}
fn default_concurrency() -> usize {
    5
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,

    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Build cache file, relative to the working directory.
    #[serde(default = "default_cache_file")]
    pub cache_file: String,

    #[serde(default = "default_site_url")]
    pub site_url: String,

    #[serde(default = "default_site_title")]
    pub site_title: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            static_dir: default_static_dir(),
            output_dir: default_output_dir(),
            cache_file: default_cache_file(),
            site_url: default_site_url(),
            site_title: default_site_title(),
        }
    }
}

fn default_templates_dir() -> String {
    "templates".into()
}
fn default_static_dir() -> String {
    "static".into()
}
fn default_output_dir() -> String {
    "dist".into()
}
fn default_cache_file() -> String {
    ".build-cache.json".into()
}
fn default_site_url() -> String {
    "http://localhost:8080".into()
}
fn default_site_title() -> String {
    "My Blog".into()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Everything the API client needs, resolved from [`AppConfig`] and the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub api_version: String,
    pub api_key: String,
    pub database_id: String,
    pub timeout: Duration,
    pub page_size: u32,
    pub properties: PropertyNames,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
}

impl ClientConfig {
    /// Resolve the client config, reading the API token from the configured env var.
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        let api_key = validate_api_key(config)?;

        if config.remote.database_id.trim().is_empty() {
            return Err(PagesmithError::config(
                "remote.database_id is not set in pagesmith.toml",
            ));
        }

        let base_url = Url::parse(&config.remote.base_url).map_err(|e| {
            PagesmithError::config(format!(
                "invalid remote.base_url '{}': {e}",
                config.remote.base_url
            ))
        })?;

        Ok(Self {
            base_url,
            api_version: config.remote.api_version.clone(),
            api_key,
            database_id: config.remote.database_id.clone(),
            timeout: Duration::from_secs(config.remote.timeout_secs),
            page_size: config.remote.page_size.clamp(1, 100),
            properties: config.properties.clone(),
            rate_limit: config.rate_limit.clone(),
            retry: config.retry.clone(),
        })
    }
}

/// Runtime sync configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub content_dir: PathBuf,
    pub concurrency: usize,
    /// Reprocess every post regardless of its edit timestamp.
    pub force: bool,
    /// Fetch and process, but write nothing.
    pub dry_run: bool,
}

impl From<&AppConfig> for SyncConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            content_dir: PathBuf::from(&config.sync.content_dir),
            concurrency: config.sync.concurrency.max(1),
            force: false,
            dry_run: false,
        }
    }
}

/// Runtime build configuration.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub content_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cache_file: PathBuf,
    pub site_url: String,
    pub site_title: String,
    /// Ignore the build cache and regenerate everything.
    pub force: bool,
}

impl From<&AppConfig> for BuildConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            content_dir: PathBuf::from(&config.sync.content_dir),
            templates_dir: PathBuf::from(&config.build.templates_dir),
            static_dir: PathBuf::from(&config.build.static_dir),
            output_dir: PathBuf::from(&config.build.output_dir),
            cache_file: PathBuf::from(&config.build.cache_file),
            site_url: config.build.site_url.trim_end_matches('/').to_string(),
            site_title: config.build.site_title.clone(),
            force: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the user-level config directory (`~/.pagesmith/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PagesmithError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Resolve which config file to read: project-local first, then user-level.
pub fn config_file_path() -> Result<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(local);
    }
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config. Returns defaults if no config file exists.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PagesmithError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PagesmithError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Write a default `pagesmith.toml` into `dir`. Returns the path to the created file.
pub fn init_config(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| PagesmithError::io(dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(PagesmithError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PagesmithError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PagesmithError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API token from the configured env var, failing if unset or empty.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.remote.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(PagesmithError::config(format!(
            "API token not found. Set the {var_name} environment variable \
             to an integration token that can read the posts database."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("content_dir"));
        assert!(toml_str.contains("NOTION_TOKEN"));
        assert!(toml_str.contains("Publish Date"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.rate_limit.max_requests, 3);
        assert_eq!(parsed.rate_limit.window_secs, 60);
        assert_eq!(parsed.retry.max_retries, 3);
        assert_eq!(parsed.retry.max_delay_ms, 10_000);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let toml_str = r#"
[remote]
database_id = "db-123"

[properties]
title = "Name"

[sync]
concurrency = 2
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.remote.database_id, "db-123");
        assert_eq!(config.remote.base_url, "https://api.notion.com");
        assert_eq!(config.properties.title, "Name");
        assert_eq!(config.properties.status, "Status");
        assert_eq!(config.sync.concurrency, 2);
        assert_eq!(config.sync.content_dir, "content");
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();
        let sync = SyncConfig::from(&app);
        assert_eq!(sync.concurrency, 5);
        assert!(!sync.force);
        assert!(!sync.dry_run);

        let build = BuildConfig::from(&app);
        assert_eq!(build.output_dir, PathBuf::from("dist"));
        assert_eq!(build.cache_file, PathBuf::from(".build-cache.json"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.remote.api_key_env = "PAGESMITH_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API token not found"));
    }

    #[test]
    fn client_config_requires_database_id() {
        let mut config = AppConfig::default();
        config.remote.api_key_env = "PATH".into();
        let err = ClientConfig::from_app(&config).unwrap_err();
        assert!(err.to_string().contains("database_id"));

        config.remote.database_id = "db".into();
        let client = ClientConfig::from_app(&config).expect("resolve");
        assert_eq!(client.page_size, 100);
        assert_eq!(client.base_url.as_str(), "https://api.notion.com/");
    }
}
