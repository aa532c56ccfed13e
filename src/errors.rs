//! Errors for bus tracker
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Invalid configuration: {message}")]
    ConfigurationError { message: String },

    #[error("HTTP client error")]
    HttpClientError(#[source] reqwest::Error),

    #[error("Failed to bind {address}")]
    BindError {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error")]
    IoError(#[from] std::io::Error),
}

/// Failure of a single fetch cycle against the upstream feed
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Feed request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Feed responded with status {status}")]
    Status { status: reqwest::StatusCode },

    #[error("Malformed feed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl FetchError {
    /// Short label of the failure class, used in logs and health output
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(e) if e.is_timeout() => "timeout",
            FetchError::Transport(_) => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Payload(_) => "payload",
        }
    }
}
