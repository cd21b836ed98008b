//! Service error types.

use spanemu_core::{ErrorCode, ErrorDetail, NameError};
use spanemu_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the admin and data services.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError {
    /// Canonical code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::NotFound(_) => ErrorCode::NotFound,
            ServiceError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            ServiceError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            ServiceError::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            ServiceError::Internal(_) => ErrorCode::Internal,
            ServiceError::Storage(e) => e.code(),
        }
    }

    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl From<NameError> for ServiceError {
    fn from(e: NameError) -> Self {
        ServiceError::InvalidArgument(e.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
