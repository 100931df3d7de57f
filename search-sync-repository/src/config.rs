//! Configuration types for the search client.

/// Default cap on the number of actions in one bulk request.
pub const DEFAULT_MAX_BULK_ACTIONS: usize = 1000;

/// Configuration for the OpenSearch client.
///
/// This struct allows customization of client behavior, particularly around bulk
/// request limits. Use this to control resource usage and prevent accidentally
/// sending overly large bulk requests to the search backend.
#[derive(Debug, Clone)]
pub struct SearchClientConfig {
    /// Maximum number of actions allowed in a single bulk request.
    ///
    /// Set to `None` to disable the limit (not recommended for production).
    /// Defaults to 1000 if not specified.
    pub max_bulk_actions: Option<usize>,

    /// Wait for a refresh after each bulk request so writes are immediately
    /// searchable. Slows down indexing; intended for development and tests.
    pub refresh_after_bulk: bool,
}

impl Default for SearchClientConfig {
    fn default() -> Self {
        Self {
            max_bulk_actions: Some(DEFAULT_MAX_BULK_ACTIONS),
            refresh_after_bulk: false,
        }
    }
}

impl SearchClientConfig {
    /// Create a config with no bulk size limit.
    ///
    /// # Warning
    ///
    /// Use with caution. Removing bulk size limits can lead to memory issues
    /// and timeouts when processing very large batches.
    pub fn unlimited() -> Self {
        Self {
            max_bulk_actions: None,
            ..Self::default()
        }
    }

    /// Create a config with a custom bulk size limit.
    pub fn with_max_bulk_actions(max_bulk_actions: usize) -> Self {
        Self {
            max_bulk_actions: Some(max_bulk_actions),
            ..Self::default()
        }
    }

    /// Check a bulk request size against the configured limit.
    pub fn validate_bulk_size(&self, size: usize) -> Result<(), crate::SearchIndexError> {
        if let Some(max) = self.max_bulk_actions {
            if size > max {
                return Err(crate::SearchIndexError::validation(format!(
                    "Bulk request of {} actions exceeds maximum {}",
                    size, max
                )));
            }
        }
        Ok(())
    }
}
