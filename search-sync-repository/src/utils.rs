//! Utility functions for the search sync repository.

/// Validate a table, column or index-name fragment.
///
/// Identifiers must be non-empty and contain only alphanumeric characters and
/// underscores. They are interpolated into SQL statements and index names, so
/// anything else is rejected.
///
/// # Returns
///
/// * `Ok(())` - If the identifier is valid
/// * `Err(String)` - A description of the problem
///
/// # Example
///
/// ```
/// use search_sync_repository::validate_identifier;
///
/// assert!(validate_identifier("blog_post").is_ok());
/// assert!(validate_identifier("blog-post").is_err());
/// ```
pub fn validate_identifier(identifier: &str) -> Result<(), String> {
    if identifier.is_empty() {
        return Err("Identifiers cannot be empty".to_string());
    }

    if !identifier.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!(
            "Identifier '{}' contains invalid characters. Only alphanumeric characters and underscores are allowed",
            identifier
        ));
    }

    Ok(())
}
