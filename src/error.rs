//! Error handling for camscout

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unusable subnet specification
    #[error("Invalid subnet: {0}")]
    InvalidSubnet(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol could not be confirmed on the probed endpoint
    #[error("Not detected: {0}")]
    NotDetected(String),

    /// RTSP session error
    #[error("RTSP error: {0}")]
    Rtsp(String),

    /// Authentication rejected after the single credential retry
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Operation exceeded its deadline
    #[error("Timed out")]
    Timeout,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
