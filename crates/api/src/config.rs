use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("{var} must be a positive number, got {raw:?}")]
    InvalidNumber { var: &'static str, raw: String },
}

/// Connection settings for the exam backend.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl ApiConfig {
    /// Build a config for `base_url` with no token and the default timeout.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if the URL does not parse.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let base_url = parse_base_url(base_url)?;
        Ok(Self {
            base_url,
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Read `EXAM_API_BASE_URL`, `EXAM_API_TOKEN` and `EXAM_API_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the base URL is missing or malformed, or the
    /// timeout is not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_base_url(None)
    }

    /// Like `from_env`, but `base_url` wins over `EXAM_API_BASE_URL` when given.
    ///
    /// # Errors
    ///
    /// Same as `from_env`.
    pub fn from_env_with_base_url(base_url: Option<&str>) -> Result<Self, ConfigError> {
        let raw_url = match base_url {
            Some(raw) => raw.to_string(),
            None => env::var("EXAM_API_BASE_URL").map_err(|_| ConfigError::Missing("EXAM_API_BASE_URL"))?,
        };
        let mut config = Self::new(&raw_url)?;

        config.token = env::var("EXAM_API_TOKEN")
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        if let Ok(raw) = env::var("EXAM_API_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(parse_positive("EXAM_API_TIMEOUT_SECS", &raw)?);
        }
        Ok(config)
    }
}

/// Parse a strictly positive integer from an environment value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidNumber` for zero, negative or non-numeric input.
pub fn parse_positive(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidNumber {
            var,
            raw: raw.to_string(),
        }),
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    // Url::join drops the last path segment unless the base ends with a slash.
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&normalized).map_err(|_| ConfigError::InvalidBaseUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl(raw.to_string()));
    }
    Ok(url)
}
