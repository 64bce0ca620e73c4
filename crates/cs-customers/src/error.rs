//! Error types for the customer store

use thiserror::Error;

/// Store error types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Record type ("customer", "alert").
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be interpreted.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn customer_not_found(id: impl ToString) -> Self {
        StoreError::NotFound {
            entity: "customer",
            id: id.to_string(),
        }
    }

    pub(crate) fn alert_not_found(id: impl ToString) -> Self {
        StoreError::NotFound {
            entity: "alert",
            id: id.to_string(),
        }
    }

    /// Whether the error is the caller's fault (bad input or unknown id).
    pub fn is_client_error(&self) -> bool {
        matches!(self, StoreError::NotFound { .. } | StoreError::Validation(_))
    }
}
