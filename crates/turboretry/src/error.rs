//! Harness error types

use turboretry_core::PolicyError;

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors raised while configuring or starting the harness
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid retry policy
    #[error("invalid retry policy: {0}")]
    Policy(#[from] PolicyError),

    /// Failure reading a configuration file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl From<toml::de::Error> for HarnessError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
