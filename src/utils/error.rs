use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

/// How a caller should react to an error: validation failures are never
/// retried, conflicts are a business outcome the caller decides about,
/// transient errors are safe to retry with backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Expired,
    NotFound,
    Unauthenticated,
    Transient,
    Internal,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User {user_id} already holds an active queue token")]
    AlreadyRegistered { user_id: Uuid },

    #[error("Seat {seat_id} is not available")]
    SeatUnavailable { seat_id: Uuid },

    #[error("Insufficient balance: have {balance}, requested {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("Token expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Unauthenticated(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Timed out waiting for lock on {key}")]
    LockTimeout { key: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ValidationError(_) => ErrorKind::Validation,
            AppError::AlreadyRegistered { .. } => ErrorKind::Conflict,
            AppError::SeatUnavailable { .. } => ErrorKind::Conflict,
            AppError::InsufficientBalance { .. } => ErrorKind::Conflict,
            AppError::InvalidState(_) => ErrorKind::Conflict,
            AppError::Expired { .. } => ErrorKind::Expired,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            AppError::LockTimeout { .. } => ErrorKind::Transient,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AlreadyRegistered { .. } => "ALREADY_REGISTERED",
            AppError::SeatUnavailable { .. } => "SEAT_UNAVAILABLE",
            AppError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            AppError::Expired { .. } => "EXPIRED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::LockTimeout { .. } => "LOCK_TIMEOUT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Transient errors never represent a business outcome; callers may
    /// retry them with backoff.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn log(&self) {
        match self {
            AppError::LockTimeout { key } => {
                warn!(error = ?self, key = %key, "Lock wait timed out");
            }
            AppError::Internal(msg) => {
                error!(error = ?self, message = %msg, "Internal error");
            }
            _ => {
                warn!(error = ?self, code = self.code(), "Operation failed");
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
