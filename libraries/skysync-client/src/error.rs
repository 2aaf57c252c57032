//! Error types for the cloud client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed (non-connection errors)
    #[error("Request error: {0}")]
    Request(reqwest::Error),

    /// Could not reach the server at all
    #[error("Server unreachable: {0}")]
    ServerUnreachable(String),

    /// Base URL was malformed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Response body did not parse
    #[error("Failed to parse server response: {0}")]
    Parse(String),

    /// Server returned a non-success status
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Session could not be established (no XSRF cookie)
    #[error("Session error: {0}")]
    Session(String),

    /// Identity key file missing or malformed
    #[error("Identity error: {0}")]
    Identity(String),

    /// IO error reading key material
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ClientError::ServerUnreachable(err.to_string())
        } else {
            ClientError::Request(err)
        }
    }
}
