use std::env;
use std::path::PathBuf;

use crate::stream::buffer::DEFAULT_MAX_LOG_LINES;

const DEFAULT_STREAM_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the backend serving `/logs/code-worker/stream`
    pub stream_base_url: String,
    /// Optional job filter, empty for all jobs
    pub stream_job_id: String,
    /// Connect immediately on startup
    pub auto_connect: bool,
    /// Base URL for REST calls such as `/health`
    pub api_base_url: String,
    /// Log buffer capacity
    pub max_log_lines: usize,
    /// Directory for downloaded log files
    pub export_dir: PathBuf,
    /// Health polling interval, 0 disables polling
    pub health_check_interval_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let stream_base_url = get("STREAM_BASE_URL").unwrap_or_else(|| {
            tracing::info!(
                default = DEFAULT_STREAM_BASE_URL,
                "STREAM_BASE_URL not set, using default"
            );
            DEFAULT_STREAM_BASE_URL.to_string()
        });

        let stream_job_id = get("STREAM_JOB_ID").unwrap_or_default();

        let auto_connect = match get("STREAM_AUTO_CONNECT") {
            Some(value) => parse_bool(&value).ok_or(ConfigError::InvalidBool {
                key: "STREAM_AUTO_CONNECT",
                value,
            })?,
            None => true,
        };

        let api_base_url = get("API_BASE_URL").unwrap_or_else(|| stream_base_url.clone());

        let max_log_lines = match get("MAX_LOG_LINES") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|lines| *lines > 0)
                .ok_or(ConfigError::InvalidMaxLogLines(value))?,
            None => DEFAULT_MAX_LOG_LINES,
        };

        let export_dir = get("LOG_EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let health_check_interval_secs = match get("HEALTH_CHECK_INTERVAL_SECS") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidHealthInterval(value))?,
            None => DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
        };

        Ok(Self {
            stream_base_url,
            stream_job_id,
            auto_connect,
            api_base_url,
            max_log_lines,
            export_dir,
            health_check_interval_secs,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a boolean, got {value:?}")]
    InvalidBool { key: &'static str, value: String },
    #[error("MAX_LOG_LINES must be a positive integer, got {0:?}")]
    InvalidMaxLogLines(String),
    #[error("HEALTH_CHECK_INTERVAL_SECS must be a non-negative integer, got {0:?}")]
    InvalidHealthInterval(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn should_use_defaults_when_nothing_is_set() {
        // Act
        let config = AppConfig::from_lookup(lookup_from(&[])).expect("defaults must load");

        // Assert
        assert_eq!(config.stream_base_url, "http://localhost:8080");
        assert_eq!(config.stream_job_id, "");
        assert!(config.auto_connect);
        assert_eq!(config.api_base_url, "http://localhost:8080");
        assert_eq!(config.max_log_lines, 2000);
        assert_eq!(config.export_dir, PathBuf::from("."));
        assert_eq!(config.health_check_interval_secs, 30);
    }

    #[test]
    fn should_read_all_values() {
        // Arrange
        let lookup = lookup_from(&[
            ("STREAM_BASE_URL", "http://worker:9000/"),
            ("STREAM_JOB_ID", "42"),
            ("STREAM_AUTO_CONNECT", "false"),
            ("API_BASE_URL", "http://api:8080"),
            ("MAX_LOG_LINES", "500"),
            ("LOG_EXPORT_DIR", "/tmp/exports"),
            ("HEALTH_CHECK_INTERVAL_SECS", "0"),
        ]);

        // Act
        let config = AppConfig::from_lookup(lookup).expect("config must load");

        // Assert
        assert_eq!(config.stream_base_url, "http://worker:9000/");
        assert_eq!(config.stream_job_id, "42");
        assert!(!config.auto_connect);
        assert_eq!(config.api_base_url, "http://api:8080");
        assert_eq!(config.max_log_lines, 500);
        assert_eq!(config.export_dir, PathBuf::from("/tmp/exports"));
        assert_eq!(config.health_check_interval_secs, 0);
    }

    #[test]
    fn should_treat_empty_values_as_unset() {
        let lookup = lookup_from(&[("API_BASE_URL", ""), ("STREAM_BASE_URL", "http://a:1")]);

        let config = AppConfig::from_lookup(lookup).expect("config must load");

        assert_eq!(config.api_base_url, "http://a:1");
    }

    #[test]
    fn should_reject_zero_max_log_lines() {
        let result = AppConfig::from_lookup(lookup_from(&[("MAX_LOG_LINES", "0")]));

        assert!(matches!(result, Err(ConfigError::InvalidMaxLogLines(_))));
    }

    #[test]
    fn should_reject_non_numeric_max_log_lines() {
        let result = AppConfig::from_lookup(lookup_from(&[("MAX_LOG_LINES", "lots")]));

        assert!(matches!(result, Err(ConfigError::InvalidMaxLogLines(_))));
    }

    #[test]
    fn should_reject_invalid_auto_connect() {
        let result = AppConfig::from_lookup(lookup_from(&[("STREAM_AUTO_CONNECT", "maybe")]));

        assert!(matches!(
            result,
            Err(ConfigError::InvalidBool {
                key: "STREAM_AUTO_CONNECT",
                ..
            })
        ));
    }

    #[test]
    fn should_reject_negative_health_interval() {
        let result = AppConfig::from_lookup(lookup_from(&[("HEALTH_CHECK_INTERVAL_SECS", "-5")]));

        assert!(matches!(result, Err(ConfigError::InvalidHealthInterval(_))));
    }
}
