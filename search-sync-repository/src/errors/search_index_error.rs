//! Search index error types.
//!
//! This module defines the unified error type for all search backend operations,
//! including transport failures, per-document bulk failures and index/alias
//! management errors.

use thiserror::Error;

use crate::types::BulkItemError;

/// Unified errors from search index operations.
///
/// Used by the `SearchClient` trait for all backend operations. A bulk request
/// that reaches the backend but reports per-document errors is surfaced as a
/// single [`SearchIndexError::BulkFailure`] carrying every failing item;
/// connection or protocol problems are [`SearchIndexError::TransportError`].
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Validation error (e.g., invalid index or alias names).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failed to establish connection to the search index backend.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request could not be delivered or the backend answered with a
    /// non-success status for the request as a whole.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Bulk request completed but some documents failed.
    #[error("Bulk request reported {} failing document(s)", .errors.len())]
    BulkFailure { errors: Vec<BulkItemError> },

    /// Failed to create an index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// Failed to delete an index.
    #[error("Index deletion error: {0}")]
    IndexDeletionError(String),

    /// Failed to read or change aliases.
    #[error("Alias error: {0}")]
    AliasError(String),

    /// The alias does not exist.
    #[error("Alias not found: {0}")]
    AliasNotFound(String),

    /// A handler's mapping does not have the expected shape.
    #[error("Malformed mapping for index '{index}': {reason}")]
    MalformedMapping { index: String, reason: String },

    /// Failed to parse response from search index backend.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize data for the search index backend.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SearchIndexError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    /// Create a bulk failure from the failing items of a bulk response.
    pub fn bulk_failure(errors: Vec<BulkItemError>) -> Self {
        Self::BulkFailure { errors }
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create an index deletion error.
    pub fn index_deletion(msg: impl Into<String>) -> Self {
        Self::IndexDeletionError(msg.into())
    }

    /// Create an alias error.
    pub fn alias(msg: impl Into<String>) -> Self {
        Self::AliasError(msg.into())
    }

    /// Create an alias not found error.
    pub fn alias_not_found(alias: impl Into<String>) -> Self {
        Self::AliasNotFound(alias.into())
    }

    /// Create a malformed mapping error.
    pub fn malformed_mapping(index: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedMapping {
            index: index.into(),
            reason: reason.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Failing items of a bulk failure, empty for every other error.
    pub fn bulk_errors(&self) -> &[BulkItemError] {
        match self {
            Self::BulkFailure { errors } => errors,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_failure_message_counts_items() {
        let error = SearchIndexError::bulk_failure(vec![
            BulkItemError {
                index_name: "blog".to_string(),
                document_id: "1".to_string(),
                operation: "index".to_string(),
                status: 400,
                reason: "mapper_parsing_exception".to_string(),
            },
            BulkItemError {
                index_name: "blog".to_string(),
                document_id: "2".to_string(),
                operation: "index".to_string(),
                status: 429,
                reason: "es_rejected_execution_exception".to_string(),
            },
        ]);

        assert_eq!(
            error.to_string(),
            "Bulk request reported 2 failing document(s)"
        );
        assert_eq!(error.bulk_errors().len(), 2);
        assert!(SearchIndexError::transport("down").bulk_errors().is_empty());
    }
}
