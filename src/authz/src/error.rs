//! Error types for the permission engine

use thiserror::Error;

/// Permission engine errors
///
/// An unsupported resource shape is *not* an error; it is reported as
/// [`Decision::Indeterminate`](crate::Decision::Indeterminate).
#[derive(Debug, Error)]
pub enum PermissionError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Attempt to remove one of the reserved rows
    #[error("Reserved row: {0}")]
    Reserved(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be parsed
    #[error("Settings parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PermissionError {
    /// Adapter for `map_err` on sqlx calls, keeping the failed operation in the message.
    pub(crate) fn db(context: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |e| PermissionError::Database(format!("{}: {}", context, e))
    }
}

/// Result type for permission operations
pub type Result<T> = std::result::Result<T, PermissionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_keeps_context() {
        let err = PermissionError::db("Failed to load lookups")(sqlx::Error::RowNotFound);
        let msg = err.to_string();
        assert!(msg.starts_with("Database error: Failed to load lookups"));
    }
}
