//! Worker configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CACHETTE_*)
//! 2. TOML config file (if CACHETTE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! Generation identifiers are part of configuration on purpose: the worker
//! is constructed from a `WorkerConfig`, never from module-level constants,
//! so several versions can coexist in tests.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Worker configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CACHETTE_*)
/// 2. TOML config file (if CACHETTE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Deployment version token; changes with every deployed build.
    ///
    /// Set via CACHETTE_VERSION environment variable.
    #[serde(default = "default_version")]
    pub version: String,

    /// Prefix shared by all generation names of this product.
    ///
    /// Set via CACHETTE_CACHE_PREFIX environment variable.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Origin the worker fronts; all request paths are joined onto it.
    ///
    /// Set via CACHETTE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Address the gateway listens on.
    ///
    /// Set via CACHETTE_LISTEN environment variable.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path to the SQLite entry store.
    ///
    /// Set via CACHETTE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Bootstrap manifest: paths warmed into the static generation at
    /// install time, best effort.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Reserved path prefix always classified as a static asset.
    #[serde(default = "default_static_prefix")]
    pub static_prefix: String,

    /// Path of the document served when an offline navigation has no
    /// cached entry of its own.
    #[serde(default = "default_fallback_path")]
    pub fallback_path: String,

    /// User-Agent string for upstream requests.
    ///
    /// Set via CACHETTE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via CACHETTE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Upstream request timeout in milliseconds.
    ///
    /// Set via CACHETTE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Activate immediately after install instead of holding at waiting.
    ///
    /// Set via CACHETTE_SKIP_WAITING environment variable. When false the
    /// worker stays in the waiting state until told to activate over the
    /// control channel, which is how "update available" prompts are built.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,
}

fn default_version() -> String {
    "v1".into()
}

fn default_cache_prefix() -> String {
    "cachette".into()
}

fn default_origin() -> String {
    "http://127.0.0.1:5173".into()
}

fn default_listen() -> String {
    "127.0.0.1:8787".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./cachette.sqlite")
}

fn default_precache() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/manifest.json",
        "/pwa-192x192.png",
        "/pwa-384x384.png",
        "/pwa-512x512.png",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_static_prefix() -> String {
    "/static/".into()
}

fn default_fallback_path() -> String {
    "/".into()
}

fn default_user_agent() -> String {
    "cachette/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_true() -> bool {
    true
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            cache_prefix: default_cache_prefix(),
            origin: default_origin(),
            listen: default_listen(),
            db_path: default_db_path(),
            precache: default_precache(),
            static_prefix: default_static_prefix(),
            fallback_path: default_fallback_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            skip_waiting: true,
        }
    }
}

impl WorkerConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `CACHETTE_`
    /// 2. TOML file from `CACHETTE_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("CACHETTE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CACHETTE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.version, "v1");
        assert_eq!(config.cache_prefix, "cachette");
        assert_eq!(config.db_path, PathBuf::from("./cachette.sqlite"));
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.static_prefix, "/static/");
        assert_eq!(config.fallback_path, "/");
        assert!(config.skip_waiting);
        assert_eq!(config.precache.len(), 6);
        assert!(config.precache.contains(&"/pwa-192x192.png".to_string()));
    }

    #[test]
    fn test_timeout_duration() {
        let config = WorkerConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_fallback_is_precached_by_default() {
        let config = WorkerConfig::default();
        assert!(config.precache.contains(&config.fallback_path));
    }
}
