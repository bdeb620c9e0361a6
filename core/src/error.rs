use crate::models::TaskStatus;
use thiserror::Error;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, CoordError>;

/// Error types for the task coordination engine.
///
/// The variants are grouped by what the caller can do about them:
/// `InvalidState` means the operation was invoked in a state where it
/// makes no sense and must not be retried as-is; `Git` wraps an external
/// process failure (the message carries the underlying stderr) and the
/// task's logical state has not been mutated; `Database` indicates the
/// store itself failed and is bubbled up unchanged.
///
/// Soft precondition failures of `claim_task` are *not* errors; they are
/// reported as a structured `{success: false}` result so a worker can
/// retry after the blocking condition clears.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordError {
    /// Entity not found by the given identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation invoked in a state where it is meaningless
    #[error("Cannot {operation}: task is {status}")]
    InvalidState {
        operation: String,
        status: TaskStatus,
    },

    /// Validation error with details
    #[error("Validation error: {0}")]
    Validation(String),

    /// External git process failure; message includes git's stderr
    #[error("Git error: {0}")]
    Git(String),

    /// Database operation error
    #[error("Database error: {0}")]
    Database(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal system error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordError {
    /// Create a not found error for a task id
    pub fn not_found_task(id: &str) -> Self {
        Self::NotFound(format!("Task '{id}' not found"))
    }

    /// Create a not found error for a task group id
    pub fn not_found_group(id: &str) -> Self {
        Self::NotFound(format!("Task group '{id}' not found"))
    }

    /// Create an invalid-state error for an operation attempted in the wrong status
    pub fn invalid_state(operation: &str, status: TaskStatus) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            status,
        }
    }

    /// Check if this error indicates a not found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoordError::NotFound(_))
    }

    /// Check if this error indicates a validation problem
    pub fn is_validation(&self) -> bool {
        matches!(self, CoordError::Validation(_))
    }

    /// Check if this error indicates a git process failure
    pub fn is_git(&self) -> bool {
        matches!(self, CoordError::Git(_))
    }

    /// Check if this error indicates a database problem
    pub fn is_database(&self) -> bool {
        matches!(self, CoordError::Database(_))
    }
}

impl From<serde_json::Error> for CoordError {
    fn from(err: serde_json::Error) -> Self {
        CoordError::Serialization(err.to_string())
    }
}
