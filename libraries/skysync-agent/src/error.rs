use thiserror::Error;

/// Errors that can occur inside the sync agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Core error: {0}")]
    Core(#[from] skysync_core::CoreError),

    #[error("Cloud client error: {0}")]
    Client(#[from] skysync_client::ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transfer error: {0}")]
    Transfer(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
