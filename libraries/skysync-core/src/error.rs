/// Core error types for SkySync
use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for SkySync
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration load/validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration serialization errors
    #[error("Configuration serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
