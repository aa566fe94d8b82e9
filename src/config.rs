//! Run configuration.
//!
//! The config file is a small JSON document with the API credentials and
//! optional tuning knobs. Validation happens before any network call so a
//! bad config fails fast.

use std::path::Path;

use serde::Deserialize;

use crate::transform;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
const DEFAULT_PAGE_SIZE: u32 = 200;

/// Errors raised while loading or validating the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing or empty required config field: {0}")]
    MissingField(&'static str),

    #[error("Invalid start_date {value:?}: expected an RFC 3339 timestamp or YYYY-MM-DD date")]
    InvalidStartDate { value: String },

    #[error("Invalid config value: {0}")]
    InvalidValue(&'static str),
}

/// Parsed run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Copper API access token (X-PW-AccessToken).
    pub api_token: String,

    /// Email of the API token's owner (X-PW-UserEmail).
    pub account_email: String,

    /// Default bookmark for incremental streams with no prior state. When
    /// absent, a fresh incremental stream syncs its full history.
    #[serde(default)]
    pub start_date: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Page size for search endpoints.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Config {
    /// Read and validate a config file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let blob = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_json::from_str(&blob).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_token.trim().is_empty() {
            return Err(ConfigError::MissingField("api_token"));
        }
        if self.account_email.trim().is_empty() {
            return Err(ConfigError::MissingField("account_email"));
        }
        if let Some(start_date) = &self.start_date {
            if transform::parse_timestamp(start_date).is_err() {
                return Err(ConfigError::InvalidStartDate {
                    value: start_date.clone(),
                });
            }
        }
        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue("page_size must be positive"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "request_timeout_secs must be positive",
            ));
        }
        Ok(())
    }

    /// The configured start date as epoch seconds, if set. Validation has
    /// already checked parseability.
    pub fn start_date_epoch(&self) -> Option<i64> {
        self.start_date
            .as_deref()
            .and_then(|s| transform::parse_timestamp(s).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config() {
        let file = write_config(r#"{"api_token": "t", "account_email": "a@example.com"}"#);
        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.api_token, "t");
        assert_eq!(config.page_size, 200);
        assert_eq!(config.request_timeout_secs, 300);
        assert!(config.start_date_epoch().is_none());
    }

    #[test]
    fn test_start_date_parsing() {
        let file = write_config(
            r#"{"api_token": "t", "account_email": "a@example.com", "start_date": "2020-01-01"}"#,
        );
        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.start_date_epoch(), Some(1_577_836_800));
    }

    #[test]
    fn test_missing_required_field() {
        let file = write_config(r#"{"api_token": "", "account_email": "a@example.com"}"#);
        let err = Config::from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("api_token")));
    }

    #[test]
    fn test_invalid_start_date() {
        let file = write_config(
            r#"{"api_token": "t", "account_email": "a@example.com", "start_date": "soon"}"#,
        );
        let err = Config::from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStartDate { .. }));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let file = write_config(
            r#"{"api_token": "t", "account_email": "a@example.com", "page_size": 0}"#,
        );
        assert!(Config::from_path(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_path("/nonexistent/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
