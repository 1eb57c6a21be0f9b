//! MVG (Munich public transport) API client.
//!
//! Two endpoints are used:
//! - `/.rest/zdm/stations` for station metadata, refreshed rarely
//! - `/api/bgw-pt/v3/departures?globalId=...` for the live board of one
//!   station, polled every ingestion run
//!
//! Board entries are loosely typed and decoded leniently; turning them into
//! records is the job of [`crate::normalize`].

mod client;
mod error;
mod mock;
mod types;

pub use client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, MvgClient, MvgConfig};
pub use error::{ApiError, FetchError};
pub use mock::MockMvgClient;
pub use types::{RawDeparture, Scalar, StationDto, decode_entries};
