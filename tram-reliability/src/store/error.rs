//! Storage error types.

/// Errors from the departure store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The database URL could not be parsed
    #[error("invalid database url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// Could not open or create the database
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    /// Creating tables or indexes failed
    #[error("schema initialization failed: {0}")]
    Schema(#[source] sqlx::Error),

    /// A read or write failed
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// A stored row no longer decodes into a record
    #[error("corrupt row: {message}")]
    Corrupt { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StorageError::InvalidUrl {
            url: "postgres://x".into(),
            message: "unsupported scheme".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid database url postgres://x: unsupported scheme"
        );

        let err = StorageError::Query(sqlx::Error::RowNotFound);
        assert!(err.to_string().starts_with("query failed:"));
    }
}
