//! MVG client error types.

use crate::domain::StationId;

/// Errors from a single request against the MVG API.
///
/// `Clone` so a failure can be recorded in a run summary and still be
/// logged by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Could not connect, or the connection dropped mid-request
    #[error("connection failed: {0}")]
    Connection(String),

    /// API returned a non-success status code
    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    /// The body was not the JSON shape we expected
    #[error("malformed payload: {message}")]
    Payload {
        message: String,
        body: Option<String>,
    },
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Payload {
                message: err.to_string(),
                body: None,
            }
        } else if let Some(status) = err.status() {
            ApiError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ApiError::Connection(err.to_string())
        }
    }
}

/// A departure fetch that failed for one station.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("station {station}: {source}")]
pub struct FetchError {
    pub station: StationId,
    #[source]
    pub source: ApiError,
}

impl FetchError {
    pub fn new(station: StationId, source: ApiError) -> Self {
        Self { station, source }
    }
}
