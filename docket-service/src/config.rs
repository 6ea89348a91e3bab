//! Service Configuration Module
//!
//! Configuration for the status oracle client, the indexed cache and
//! logging. Everything is loaded from `DOCKET_*` environment variables; only
//! the oracle URL is required, every other value has a default.

use std::time::Duration;

use docket_core::ConfigError;
use docket_storage::CacheConfig;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// ORACLE CONFIGURATION
// ============================================================================

/// Connection settings for the external status oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConfig {
    /// Base URL; statuses are fetched from `{url}/status/{id}`.
    pub url: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Timeout for the whole request, body included.
    pub request_timeout: Duration,
}

impl OracleConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the connect timeout. Zero restores the default.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = non_zero_or(timeout, DEFAULT_CONNECT_TIMEOUT);
        self
    }

    /// Set the request timeout. Zero restores the default.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = non_zero_or(timeout, DEFAULT_REQUEST_TIMEOUT);
        self
    }

    /// Load from environment variables.
    ///
    /// Environment variables:
    /// - `DOCKET_ORACLE_URL`: base URL (required)
    /// - `DOCKET_ORACLE_CONNECT_TIMEOUT_MS`: connect timeout (default: 1000)
    /// - `DOCKET_ORACLE_REQUEST_TIMEOUT_MS`: request timeout (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup using the environment variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup("DOCKET_ORACLE_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "DOCKET_ORACLE_URL".to_string(),
            })?;

        let connect_timeout = millis(&lookup, "DOCKET_ORACLE_CONNECT_TIMEOUT_MS")?;
        let request_timeout = millis(&lookup, "DOCKET_ORACLE_REQUEST_TIMEOUT_MS")?;

        Ok(Self::new(url)
            .with_connect_timeout(connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
            .with_request_timeout(request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT)))
    }
}

fn non_zero_or(value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        default
    } else {
        value
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

// ============================================================================
// TELEMETRY CONFIGURATION
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_directive: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Load from environment variables.
    ///
    /// Environment variables:
    /// - `DOCKET_LOG`: default filter directive (default: "info")
    /// - `DOCKET_LOG_JSON`: "true" or "1" for JSON output (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            default_directive: lookup("DOCKET_LOG")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.default_directive),
            json: lookup("DOCKET_LOG_JSON")
                .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1"))
                .unwrap_or(defaults.json),
        }
    }
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Everything needed to assemble an
/// [`ApplicationService`](crate::ApplicationService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub oracle: OracleConfig,
    pub cache: CacheConfig,
    pub telemetry: TelemetryConfig,
}

impl ServiceConfig {
    pub fn new(oracle: OracleConfig) -> Self {
        Self {
            oracle,
            cache: CacheConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Load every section from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            oracle: OracleConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            telemetry: TelemetryConfig::from_env(),
        })
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_oracle_url_is_required() {
        let err = OracleConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));

        let err = OracleConfig::from_lookup(lookup_from(&[("DOCKET_ORACLE_URL", "  ")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn test_oracle_defaults() {
        let config =
            OracleConfig::from_lookup(lookup_from(&[("DOCKET_ORACLE_URL", "http://oracle:8080")]))
                .unwrap();
        assert_eq!(config.url, "http://oracle:8080");
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_oracle_timeouts_from_millis() {
        let config = OracleConfig::from_lookup(lookup_from(&[
            ("DOCKET_ORACLE_URL", "http://oracle"),
            ("DOCKET_ORACLE_CONNECT_TIMEOUT_MS", "250"),
            ("DOCKET_ORACLE_REQUEST_TIMEOUT_MS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_oracle_timeout_must_be_numeric() {
        let err = OracleConfig::from_lookup(lookup_from(&[
            ("DOCKET_ORACLE_URL", "http://oracle"),
            ("DOCKET_ORACLE_REQUEST_TIMEOUT_MS", "soon"),
        ]))
        .unwrap_err();
        match err {
            ConfigError::InvalidValue { field, value, .. } => {
                assert_eq!(field, "DOCKET_ORACLE_REQUEST_TIMEOUT_MS");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_telemetry_from_lookup() {
        assert_eq!(
            TelemetryConfig::from_lookup(lookup_from(&[])),
            TelemetryConfig::default()
        );

        let config = TelemetryConfig::from_lookup(lookup_from(&[
            ("DOCKET_LOG", "docket_storage=debug"),
            ("DOCKET_LOG_JSON", "TRUE"),
        ]));
        assert_eq!(config.default_directive, "docket_storage=debug");
        assert!(config.json);
    }

    #[test]
    fn test_service_config_from_env() {
        let _url = EnvVarGuard::set("DOCKET_ORACLE_URL", Some("http://localhost:9090"));
        let _chunk = EnvVarGuard::set("DOCKET_CACHE_WARM_UP_CHUNK_SIZE", Some("64"));

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.oracle.url, "http://localhost:9090");
        assert_eq!(config.cache.warm_up_chunk_size, 64);
    }
}
