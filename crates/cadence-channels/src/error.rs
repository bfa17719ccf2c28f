use thiserror::Error;

/// Errors raised while building or registering adapters.
///
/// Publish-time failures are not errors; they are reported as
/// [`PublishFailure`](crate::types::PublishFailure).
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// The adapter-specific configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
