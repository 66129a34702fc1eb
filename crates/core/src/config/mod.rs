//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (RINGSIDE_*)
//! 2. TOML config file (if RINGSIDE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (RINGSIDE_*)
/// 2. TOML config file (if RINGSIDE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Prefix of every cache partition name.
    ///
    /// Set via RINGSIDE_CACHE_PREFIX environment variable.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Deployed asset version. Bumping it and redeploying is the only
    /// supported upgrade or rollback.
    ///
    /// Set via RINGSIDE_VERSION environment variable.
    #[serde(default = "default_version")]
    pub version: String,

    /// Path to SQLite cache database.
    ///
    /// Set via RINGSIDE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin serving the site; relative manifest paths resolve against it.
    ///
    /// Set via RINGSIDE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Address the proxy host listens on.
    ///
    /// Set via RINGSIDE_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// User-Agent string for upstream requests.
    ///
    /// Set via RINGSIDE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Overall upstream request timeout in milliseconds.
    ///
    /// Set via RINGSIDE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How long network-first strategies wait before falling back to cache.
    ///
    /// Set via RINGSIDE_NETWORK_FIRST_TIMEOUT_MS environment variable.
    #[serde(default = "default_network_first_timeout_ms")]
    pub network_first_timeout_ms: u64,

    /// Maximum bytes to read per upstream response.
    ///
    /// Set via RINGSIDE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Cached page served to navigations when the network is unreachable.
    #[serde(default = "default_offline_shell")]
    pub offline_shell: String,

    /// URLs cached atomically at install time.
    #[serde(default = "default_static_manifest")]
    pub static_manifest: Vec<String>,

    /// URLs warmed into the image partition at install time, best effort.
    #[serde(default = "default_critical_content")]
    pub critical_content: Vec<String>,

    /// Data endpoints refreshed by the content sync, in addition to whatever
    /// the dynamic partition already holds.
    #[serde(default = "default_content_endpoints")]
    pub content_endpoints: Vec<String>,

    /// Endpoint receiving flushed analytics batches.
    #[serde(default = "default_analytics_endpoint")]
    pub analytics_endpoint: String,

    /// URL patterns that must never touch the cache.
    #[serde(default = "default_never_cache_patterns")]
    pub never_cache_patterns: Vec<String>,

    /// URL patterns of the application shell (cache-first).
    #[serde(default = "default_static_patterns")]
    pub static_patterns: Vec<String>,

    /// URL patterns of photos and media (stale-while-revalidate).
    #[serde(default = "default_image_patterns")]
    pub image_patterns: Vec<String>,

    /// URL patterns of data endpoints (network-first).
    #[serde(default = "default_api_patterns")]
    pub api_patterns: Vec<String>,
}

fn default_cache_prefix() -> String {
    "boxer-site".into()
}

fn default_version() -> String {
    "1.0.0".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./ringside-cache.sqlite")
}

fn default_origin() -> String {
    "http://127.0.0.1:3000".into()
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_user_agent() -> String {
    "ringside/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_network_first_timeout_ms() -> u64 {
    5_000
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_offline_shell() -> String {
    "/".into()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_static_manifest() -> Vec<String> {
    strings(&[
        "/",
        "/static/js/bundle.js",
        "/static/css/main.css",
        "/manifest.json",
        "/favicon.ico",
        "/about",
        "/fights",
        "/gallery",
        "/contact",
        "https://fonts.googleapis.com/css2?family=Bebas+Neue&display=swap",
        "https://fonts.googleapis.com/css2?family=Inter:wght@400;600;800&display=swap",
    ])
}

fn default_critical_content() -> Vec<String> {
    strings(&["/images/hero-boxer.jpg", "/images/championship-belt.png", "/images/fight-night-poster.jpg"])
}

fn default_content_endpoints() -> Vec<String> {
    strings(&["/api/fights", "/api/news"])
}

fn default_analytics_endpoint() -> String {
    "/api/analytics".into()
}

fn default_never_cache_patterns() -> Vec<String> {
    strings(&[
        r"/api/auth",
        r"/api/payments?",
        r"/checkout",
        r"/admin",
        r"/__webpack_hmr",
        r"\.hot-update\.",
        r"/sockjs-node",
        r"/@vite",
    ])
}

fn default_static_patterns() -> Vec<String> {
    strings(&[
        r"/static/(js|css)/",
        r"/manifest\.json$",
        r"/favicon\.ico$",
        r"/icons/",
        r"^https://fonts\.(googleapis|gstatic)\.com/",
    ])
}

fn default_image_patterns() -> Vec<String> {
    strings(&[r"/images/", r"/media/", r"/gallery/", r"\.(png|jpe?g|gif|webp|avif|svg)(\?.*)?$"])
}

fn default_api_patterns() -> Vec<String> {
    strings(&[r"/api/", r"/data/.+\.json$"])
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_prefix: default_cache_prefix(),
            version: default_version(),
            db_path: default_db_path(),
            origin: default_origin(),
            listen_addr: default_listen_addr(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            network_first_timeout_ms: default_network_first_timeout_ms(),
            max_bytes: default_max_bytes(),
            offline_shell: default_offline_shell(),
            static_manifest: default_static_manifest(),
            critical_content: default_critical_content(),
            content_endpoints: default_content_endpoints(),
            analytics_endpoint: default_analytics_endpoint(),
            never_cache_patterns: default_never_cache_patterns(),
            static_patterns: default_static_patterns(),
            image_patterns: default_image_patterns(),
            api_patterns: default_api_patterns(),
        }
    }
}

impl AppConfig {
    /// Overall upstream timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Network-first fallback timeout.
    pub fn network_first_timeout(&self) -> Duration {
        Duration::from_millis(self.network_first_timeout_ms)
    }

    /// Versioned base name shared by all partitions of this deployment.
    pub fn cache_base_name(&self) -> String {
        format!("{}-v{}", self.cache_prefix, self.version)
    }

    /// Parsed origin URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin).map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `RINGSIDE_`
    /// 2. TOML file from `RINGSIDE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("RINGSIDE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("RINGSIDE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
