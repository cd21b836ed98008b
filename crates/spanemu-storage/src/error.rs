//! Error types for the storage engine.

use spanemu_core::ErrorCode;
use thiserror::Error;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while changing schema, writing, or reading rows.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("invalid DDL statement: {0}")]
    Ddl(String),

    #[error("database has been dropped")]
    Closed,
}

impl StorageError {
    /// Canonical code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            StorageError::NotFound(_) | StorageError::Closed => ErrorCode::NotFound,
            StorageError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            StorageError::InvalidArgument(_) | StorageError::Ddl(_) => ErrorCode::InvalidArgument,
            StorageError::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            StorageError::Open(_)
            | StorageError::Transaction(_)
            | StorageError::Table(_)
            | StorageError::Read(_)
            | StorageError::Write(_)
            | StorageError::Serialize(_)
            | StorageError::Deserialize(_) => ErrorCode::Internal,
        }
    }
}
