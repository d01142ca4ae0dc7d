//! Domain errors for the Abathur task queue.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors.
///
/// Storage variants are produced by the sqlite adapter's `sqlx::Error`
/// mapping; upper layers surface them unchanged.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("No task found matching '{0}'")]
    PrefixNotFound(String),

    #[error("Ambiguous prefix '{prefix}': matches {candidates:?}")]
    AmbiguousPrefix {
        prefix: String,
        candidates: Vec<String>,
    },

    #[error("Circular dependency detected: {path}")]
    DependencyCycle { path: String },

    #[error("Self-dependency not allowed for task {0}")]
    SelfDependency(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage busy: {0}")]
    StorageBusy(String),

    #[error("Storage integrity violation: {0}")]
    StorageIntegrity(String),

    #[error("Storage I/O error: {0}")]
    StorageIo(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                let message = db.message().to_string();
                if message.contains("locked") || message.contains("busy") {
                    DomainError::StorageBusy(message)
                } else if message.contains("constraint")
                    || message.contains("FOREIGN KEY")
                    || message.contains("UNIQUE")
                    || message.contains("CHECK")
                {
                    DomainError::StorageIntegrity(message)
                } else {
                    DomainError::Internal(message)
                }
            }
            sqlx::Error::Io(io) => DomainError::StorageIo(io.to_string()),
            sqlx::Error::PoolTimedOut => {
                DomainError::StorageBusy("connection pool timed out".to_string())
            }
            sqlx::Error::RowNotFound => DomainError::Internal("row not found".to_string()),
            _ => DomainError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_maps_to_storage_io() {
        let io = std::io::Error::other("disk gone");
        let err: DomainError = sqlx::Error::Io(io).into();
        assert!(matches!(err, DomainError::StorageIo(_)));
    }

    #[test]
    fn test_pool_timeout_maps_to_busy() {
        let err: DomainError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DomainError::StorageBusy(_)));
    }
}
