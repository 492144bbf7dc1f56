//! Configuration for the provider client.
//!
//! # Environment Variables
//!
//! - `FOOTBALL_API_KEY`: football-data.org token (sent as `X-Auth-Token`)
//! - `FOOTBALL_API_BASE_URL`: API root (default: `https://api.football-data.org/v4`)
//! - `FOOTBALL_RATE_LIMIT`: requests allowed per window (default: 10)
//! - `FOOTBALL_RATE_WINDOW_SECS`: window length in seconds (default: 60)
//! - `FOOTBALL_MAX_ATTEMPTS`: attempts per fetch, first included (default: 4)
//! - `FOOTBALL_REQUEST_TIMEOUT_SECS`: per-request HTTP timeout (default: 20)

use crate::{IngestionError, RetryPolicy};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default football-data.org API root.
pub const DEFAULT_BASE_URL: &str = "https://api.football-data.org/v4";

/// Provider credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw token, for the request header only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Provider client settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: Url,

    /// `None` sends unauthenticated requests (the free tier rejects most).
    pub api_key: Option<ApiKey>,

    /// Requests allowed per `rate_window`.
    pub rate_limit: u32,

    pub rate_window: Duration,

    pub retry: RetryPolicy,

    /// HTTP timeout for a single request.
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            rate_limit: 10,
            rate_window: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(20),
        }
    }
}

impl ProviderConfig {
    /// Load settings from the environment, falling back to defaults for
    /// anything unset. Values that are set but unparseable are an error.
    pub fn from_env() -> Result<Self, IngestionError> {
        let defaults = Self::default();

        let base_url = match env::var("FOOTBALL_API_BASE_URL") {
            Ok(raw) => Url::parse(&raw)
                .map_err(|e| IngestionError::Config(format!("FOOTBALL_API_BASE_URL: {}", e)))?,
            Err(_) => defaults.base_url,
        };

        let api_key = env::var("FOOTBALL_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(ApiKey::new);
        if api_key.is_none() {
            tracing::warn!("FOOTBALL_API_KEY not set; provider requests will be unauthenticated");
        }

        let rate_limit = parse_var(
            "FOOTBALL_RATE_LIMIT",
            env::var("FOOTBALL_RATE_LIMIT").ok(),
            defaults.rate_limit,
        )?;
        let window_secs = parse_var(
            "FOOTBALL_RATE_WINDOW_SECS",
            env::var("FOOTBALL_RATE_WINDOW_SECS").ok(),
            defaults.rate_window.as_secs(),
        )?;
        let max_attempts = parse_var(
            "FOOTBALL_MAX_ATTEMPTS",
            env::var("FOOTBALL_MAX_ATTEMPTS").ok(),
            defaults.retry.max_attempts,
        )?;
        let timeout_secs = parse_var(
            "FOOTBALL_REQUEST_TIMEOUT_SECS",
            env::var("FOOTBALL_REQUEST_TIMEOUT_SECS").ok(),
            defaults.request_timeout.as_secs(),
        )?;

        Ok(Self {
            base_url,
            api_key,
            rate_limit,
            rate_window: Duration::from_secs(window_secs),
            retry: defaults.retry.with_max_attempts(max_attempts),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(ApiKey::new(key));
        self
    }

    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = url;
        self
    }

    /// Allow `limit` requests per `window`.
    pub fn with_rate_limit(mut self, limit: u32, window: Duration) -> Self {
        self.rate_limit = limit;
        self.rate_window = window;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid")
}

/// Parse an optional env value, using `default` when unset.
fn parse_var<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T, IngestionError>
where
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IngestionError::Config(format!("{}={:?}: {}", name, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.base_url.as_str(), "https://api.football-data.org/v4");
        assert_eq!(config.rate_limit, 10);
        assert_eq!(config.rate_window, Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 4);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_api_key_redacted() {
        let config = ProviderConfig::default().with_api_key("s3cr3t-token");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cr3t-token"));
        assert!(debug.contains("<redacted>"));
        assert_eq!(config.api_key.unwrap().expose(), "s3cr3t-token");
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var("X", None, 7u32).unwrap(), 7);
        assert_eq!(parse_var("X", Some(" 12 ".into()), 7u32).unwrap(), 12);
        assert!(matches!(
            parse_var("X", Some("ten".into()), 7u32),
            Err(IngestionError::Config(_))
        ));
    }
}
