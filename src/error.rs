//! Error taxonomy shared by the borrow and notification services.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BorrowError {
    /// Bad input: unknown book/student/account, malformed status, missing return date.
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Backing-store failure, including foreign-key violations.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl BorrowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BorrowError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        BorrowError::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        BorrowError::Internal(msg.into())
    }

    /// Stable kind label for outer layers mapping errors onto transport statuses.
    pub fn kind(&self) -> &'static str {
        match self {
            BorrowError::Validation(_) => "validation",
            BorrowError::NotFound(_) => "not_found",
            BorrowError::Storage(_) => "storage",
            BorrowError::Internal(_) => "internal",
        }
    }
}

pub type BorrowResult<T> = std::result::Result<T, BorrowError>;
