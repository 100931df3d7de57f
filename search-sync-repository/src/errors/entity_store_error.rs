//! Entity store error types.

use thiserror::Error;

/// Errors raised while reading the source-of-truth store.
#[derive(Debug, Error)]
pub enum EntityStoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// No table is bound to the requested entity class.
    #[error("No table binding for entity class '{0}'")]
    UnboundEntityClass(String),

    /// A table or column name failed validation.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A row could not be turned into ids or an object.
    #[error("Decode error: {0}")]
    DecodeError(String),
}

impl EntityStoreError {
    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }
}
