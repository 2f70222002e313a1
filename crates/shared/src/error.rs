use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Validation,
    Conflict,
    RateLimited,
    StoreUnavailable,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("session id must not be empty")]
    EmptySessionId,
    #[error("pair id must not be empty")]
    EmptyPairId,
    #[error("winner must be an option image name or \"neither\"")]
    EmptyWinner,
}

/// Failures crossing the remote store boundary. All variants are retryable
/// from the buffer's point of view: the buffer is retained and the flush is
/// reattempted on the next trigger.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),
    #[error("store rejected credentials: {0}")]
    PermissionDenied(String),
    #[error("store rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("store returned a malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("data directory '{0}' is not readable")]
    UnreadableDataDir(String),
    #[error("failed to read catalog entry: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session has not been started")]
    NotStarted,
    #[error("session is already complete")]
    AlreadyComplete,
    #[error("decision for pair '{submitted}' does not match current pair '{current}'")]
    StalePair { submitted: String, current: String },
    #[error("pair '{0}' has two images and requires a decision")]
    PairNotDefective(String),
    #[error("invalid vote: {0}")]
    InvalidVote(String),
}
