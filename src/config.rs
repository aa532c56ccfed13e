//! Application configuration

use std::collections::HashMap;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use reqwest::Url;
use serde::Deserialize;
use serde_with::serde_as;
use tracing::warn;

use crate::errors::TrackerError;

/// OC Transpo GTFS-realtime vehicle positions endpoint
pub const DEFAULT_FEED_URL: &str =
    "https://nextrip-public-api.azure-api.net/octranspo/gtfs-rt-vp/beta/v1/VehiclePositions";

/// Variable consulted for the subscription key when no prefixed key is set
pub const API_KEY_VAR: &str = "OCP_APIM_SUBSCRIPTION_KEY";

const ENV_PREFIX: &str = "BUSTRACKER";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub server: ServerConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub api_key: Option<String>,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub poll_interval: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub request_timeout: Duration,
    /// Upper bound of the sleep after repeated failures; equal to
    /// `poll_interval` means a fixed sleep
    #[serde_as(as = "Option<serde_with::DurationSeconds<u64>>")]
    #[serde(default)]
    pub max_backoff: Option<Duration>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl AppConfig {
    /// Load configuration from defaults, `config/default` and process
    /// environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, reading environment variables from `env` instead
    /// of the process environment when given
    pub fn load_from(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let api_key = match &env {
            Some(vars) => vars.get(API_KEY_VAR).cloned(),
            None => std::env::var(API_KEY_VAR).ok(),
        };

        let mut builder = Config::builder()
            .set_default("feed.url", DEFAULT_FEED_URL)?
            .set_default("feed.poll_interval", 30)?
            .set_default("feed.request_timeout", 10)?
            .set_default("server.bind", "127.0.0.1:5000")?;

        if let Some(key) = api_key {
            builder = builder.set_default("feed.api_key", key)?;
        }

        let config = builder
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), TrackerError> {
        self.feed.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

impl FeedConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), TrackerError> {
        self.validate_url()?;
        self.validate_api_key()?;
        self.validate_intervals()?;
        Ok(())
    }

    /// Subscription key; only valid after `validate` has passed
    pub fn api_key(&self) -> Result<&str, TrackerError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(TrackerError::ConfigurationError {
                message: format!(
                    "Feed API key missing, set {} or {}__FEED__API_KEY",
                    API_KEY_VAR, ENV_PREFIX
                ),
            }),
        }
    }

    /// Sleep ceiling after consecutive failures
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff.unwrap_or(self.poll_interval)
    }

    fn validate_url(&self) -> Result<(), TrackerError> {
        Url::parse(&self.url).map_err(|e| TrackerError::ConfigurationError {
            message: format!("Invalid feed URL {}: {}", self.url, e),
        })?;
        Ok(())
    }

    fn validate_api_key(&self) -> Result<(), TrackerError> {
        self.api_key().map(|_| ())
    }

    fn validate_intervals(&self) -> Result<(), TrackerError> {
        if self.poll_interval.is_zero() {
            return Err(TrackerError::ConfigurationError {
                message: "Poll interval must be greater than zero".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(TrackerError::ConfigurationError {
                message: "Request timeout must be greater than zero".to_string(),
            });
        }
        if self.max_backoff() < self.poll_interval {
            return Err(TrackerError::ConfigurationError {
                message: "Maximum backoff must not be shorter than the poll interval".to_string(),
            });
        }
        if self.request_timeout > self.poll_interval {
            warn!(
                "Request timeout {:?} exceeds poll interval {:?}",
                self.request_timeout, self.poll_interval
            );
        }
        Ok(())
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.bind.trim().is_empty() {
            return Err(TrackerError::ConfigurationError {
                message: "Server bind address cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}
