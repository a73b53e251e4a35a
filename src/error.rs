use std::path::PathBuf;
use thiserror::Error as ThisError;
use validator::ValidationErrors;

#[derive(Debug, ThisError)]
pub enum SchedulerError {
    #[error("invalid config file path: {}", .0.display())]
    InvalidConfigFilePath(PathBuf),

    #[error("error while loading config file: {0}")]
    FileLoad(String),

    #[error("config unmarshal error: {0}")]
    Unmarshal(#[from] figment::Error),

    #[error("config validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("error while parsing store url: {0}")]
    ConnectionUriInvalid(redis::RedisError),

    #[error("error while instantiating store client: {0}")]
    ConnectionFailed(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("operation cancelled")]
    Cancelled,
}

/// Payload-free discriminant of [`SchedulerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidConfigFilePath,
    FileLoad,
    Unmarshal,
    Validation,
    ConnectionUriInvalid,
    ConnectionFailed,
    Redis,
    KeyNotFound,
    DeadlineExceeded,
    Cancelled,
}

impl SchedulerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfigFilePath(_) => ErrorKind::InvalidConfigFilePath,
            Self::FileLoad(_) => ErrorKind::FileLoad,
            Self::Unmarshal(_) => ErrorKind::Unmarshal,
            Self::Validation(_) => ErrorKind::Validation,
            Self::ConnectionUriInvalid(_) => ErrorKind::ConnectionUriInvalid,
            Self::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            Self::Redis(_) => ErrorKind::Redis,
            Self::KeyNotFound(_) => ErrorKind::KeyNotFound,
            Self::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Connection-level failure wrapping whatever ended the liveness check.
    pub(crate) fn connection_failed(cause: impl std::fmt::Display) -> Self {
        Self::ConnectionFailed(cause.to_string())
    }
}
