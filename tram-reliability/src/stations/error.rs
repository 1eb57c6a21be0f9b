//! Station metadata error types.

use crate::mvg::ApiError;

/// Errors from loading or building station metadata and the label index.
#[derive(Debug, thiserror::Error)]
pub enum StationError {
    /// The metadata API could not be reached or answered badly
    #[error("metadata fetch failed: {0}")]
    Api(#[from] ApiError),

    /// Cache operation failed
    #[error("cache error: {message}")]
    Cache { message: String },

    /// No cache on disk and nothing could be fetched
    #[error("no station metadata available: {message}")]
    Unavailable { message: String },

    /// Label index file could not be read or written
    #[error("label index error: {message}")]
    LabelIndex { message: String },

    /// GTFS feed could not be opened or parsed
    #[error("GTFS feed error: {message}")]
    Feed { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StationError::from(ApiError::Timeout);
        assert_eq!(err.to_string(), "metadata fetch failed: request timed out");

        let err = StationError::Feed {
            message: "missing routes.txt".into(),
        };
        assert_eq!(err.to_string(), "GTFS feed error: missing routes.txt");
    }
}
