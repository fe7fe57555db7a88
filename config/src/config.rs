//! Configuration structures for the title store.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Storage backend selection plus backend-specific connection parameters.
///
/// The manager consumes this once at construction. An unknown `backend`
/// value fails fast there — there is no silent default to "local".
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct StorageConfig {
    /// Active backend kind: "local" or "remote".
    #[serde(default = "default_backend_kind")]
    #[validate(custom(function = "validate_backend_kind"))]
    pub backend: String,

    /// Local embedded-database parameters.
    #[serde(default)]
    #[validate(nested)]
    pub local: LocalConfig,

    /// Remote object-store parameters. Required when `backend` is "remote".
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend_kind(),
            local: LocalConfig::default(),
            remote: None,
        }
    }
}

fn default_backend_kind() -> String {
    "local".to_string()
}

fn validate_backend_kind(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "local" | "remote" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid backend kind")),
    }
}

/// Parameters for the embedded DuckDB store.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct LocalConfig {
    /// Path to the database file. Use ":memory:" for an in-memory store.
    #[serde(default = "default_local_path")]
    #[validate(length(min = 1))]
    pub path: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            path: default_local_path(),
        }
    }
}

fn default_local_path() -> String {
    ":memory:".to_string()
}

/// Parameters for the S3-backed store.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct RemoteConfig {
    /// Bucket holding title data.
    #[validate(length(min = 1))]
    pub bucket: String,

    /// Key prefix under which all objects live.
    #[serde(default = "default_remote_prefix")]
    pub prefix: String,

    #[serde(default = "default_remote_region")]
    pub region: String,

    /// Custom endpoint (MinIO, localstack). `None` uses AWS defaults.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Required by MinIO-style endpoints.
    #[serde(default)]
    pub force_path_style: bool,

    /// Bounded retry attempts for transient failures.
    #[serde(default = "default_max_retries")]
    #[validate(range(min = 1, max = 10))]
    pub max_retries: u32,

    /// Per-call timeout bound, seconds.
    #[serde(default = "default_timeout_secs")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

fn default_remote_prefix() -> String {
    "trendwatch".to_string()
}

fn default_remote_region() -> String {
    "us-east-1".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

/// Tunables for the incremental detector.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct DetectorSettings {
    /// Rolling lookback window, hours. Deliberately wider than 24 to
    /// tolerate late collection cycles and day-boundary skew.
    #[serde(default = "default_lookback_hours")]
    #[validate(range(min = 1, max = 48))]
    pub lookback_hours: i64,

    /// Dedupe key for the previously-seen set: "title" or "title_source".
    #[serde(default = "default_dedupe_key")]
    #[validate(custom(function = "validate_dedupe_key"))]
    pub dedupe: String,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            dedupe: default_dedupe_key(),
        }
    }
}

fn default_lookback_hours() -> i64 {
    26
}

fn default_dedupe_key() -> String {
    "title_source".to_string()
}

fn validate_dedupe_key(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "title" | "title_source" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid dedupe key")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_local_and_valid() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, "local");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_backend_kind_fails_validation() {
        let config = StorageConfig {
            backend: "ftp".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn remote_config_deserializes_with_defaults() {
        let config: RemoteConfig =
            serde_json::from_str(r#"{"bucket": "titles"}"#).unwrap();
        assert_eq!(config.prefix, "trendwatch");
        assert_eq!(config.max_retries, 3);
        assert!(config.endpoint.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn detector_settings_default_to_26_hour_window() {
        let settings = DetectorSettings::default();
        assert_eq!(settings.lookback_hours, 26);
        assert_eq!(settings.dedupe, "title_source");
        assert!(settings.validate().is_ok());
    }
}
