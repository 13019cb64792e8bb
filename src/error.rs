//! Error handling for the giver miner
//!
//! All pipeline stages report through a single error type so the mining loop
//! can log and classify failures uniformly.

use thiserror::Error;

/// Result type alias for miner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the giver miner
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Challenge parameter fetch/decode errors
    #[error("Parameter fetch error: {message}")]
    Params { message: String },

    /// External solver process errors
    #[error("Solver error: {message}")]
    Solver { message: String },

    /// Mined artifact decode errors
    #[error("Artifact error: {message}")]
    Artifact { message: String },

    /// Cell / BOC encoding errors
    #[error("BOC error: {message}")]
    Boc { message: String },

    /// Wallet key derivation and signing errors
    #[error("Wallet error: {message}")]
    Wallet { message: String },

    /// Blockchain RPC errors
    #[error("RPC error: {message}")]
    Rpc { message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a parameter fetch error
    pub fn params(message: impl Into<String>) -> Self {
        Self::Params {
            message: message.into(),
        }
    }

    /// Create a solver error
    pub fn solver(message: impl Into<String>) -> Self {
        Self::Solver {
            message: message.into(),
        }
    }

    /// Create an artifact decode error
    pub fn artifact(message: impl Into<String>) -> Self {
        Self::Artifact {
            message: message.into(),
        }
    }

    /// Create a BOC encoding error
    pub fn boc(message: impl Into<String>) -> Self {
        Self::Boc {
            message: message.into(),
        }
    }

    /// Create a wallet error
    pub fn wallet(message: impl Into<String>) -> Self {
        Self::Wallet {
            message: message.into(),
        }
    }

    /// Create an RPC error
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// The mining loop retries every cycle regardless, but retryability feeds
    /// the log level: transient failures are warnings, the rest are errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => {
                if let Some(status) = e.status() {
                    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                } else {
                    e.is_timeout() || e.is_connect() || e.is_request()
                }
            }
            Error::Timeout { .. } => true,
            Error::Rpc { .. } => true,
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Http(_) => "http",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Io(_) => "io",
            Error::Config { .. } => "config",
            Error::Params { .. } => "params",
            Error::Solver { .. } => "solver",
            Error::Artifact { .. } => "artifact",
            Error::Boc { .. } => "boc",
            Error::Wallet { .. } => "wallet",
            Error::Rpc { .. } => "rpc",
            Error::Timeout { .. } => "timeout",
        }
    }
}
