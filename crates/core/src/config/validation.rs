//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use regex::Regex;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `version` or `cache_prefix` is empty,
    /// and `ConfigError::Invalid` if:
    /// - `origin` is not an http(s) URL
    /// - `max_bytes` is 0 or exceeds 100MB
    /// - `timeout_ms` or `network_first_timeout_ms` is below 100ms or above 5 minutes
    /// - `user_agent` is empty
    /// - `static_manifest` is empty
    /// - any classification pattern fails to compile
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "version".into(),
                hint: "Set RINGSIDE_VERSION to the deployed asset version".into(),
            });
        }
        if self.cache_prefix.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "cache_prefix".into(),
                hint: "Set RINGSIDE_CACHE_PREFIX environment variable".into(),
            });
        }

        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(invalid("origin", format!("unsupported scheme: {}", origin.scheme())));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 100 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 100MB"));
        }

        for (field, value) in [("timeout_ms", self.timeout_ms), ("network_first_timeout_ms", self.network_first_timeout_ms)]
        {
            if value < 100 {
                return Err(invalid(field, "must be at least 100ms"));
            }
            if value > 300_000 {
                return Err(invalid(field, "must not exceed 5 minutes (300000ms)"));
            }
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.static_manifest.is_empty() {
            return Err(invalid("static_manifest", "must list at least one URL"));
        }

        for (field, patterns) in [
            ("never_cache_patterns", &self.never_cache_patterns),
            ("static_patterns", &self.static_patterns),
            ("image_patterns", &self.image_patterns),
            ("api_patterns", &self.api_patterns),
        ] {
            for pattern in patterns {
                Regex::new(pattern).map_err(|e| invalid(field, format!("{pattern}: {e}")))?;
            }
        }

        if self.network_first_timeout_ms > self.timeout_ms {
            tracing::warn!(
                network_first_timeout_ms = self.network_first_timeout_ms,
                timeout_ms = self.timeout_ms,
                "network_first_timeout_ms exceeds timeout_ms; \
                 the overall timeout fires first"
            );
        }

        Ok(())
    }
}
