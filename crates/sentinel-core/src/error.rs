use thiserror::Error;

/// Sentinel 统一错误类型
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, SentinelError>;

impl SentinelError {
    pub fn store(msg: impl Into<String>) -> Self {
        SentinelError::Store(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        SentinelError::Collaborator(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        SentinelError::InvalidInput(msg.into())
    }
}

impl From<anyhow::Error> for SentinelError {
    fn from(err: anyhow::Error) -> Self {
        SentinelError::Internal(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for SentinelError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        SentinelError::Timeout(std::time::Duration::ZERO)
    }
}
