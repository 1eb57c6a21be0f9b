//! Durable storage for departure records.
//!
//! The ingestion engine only needs two operations, expressed by
//! [`DepartureStore`]. [`SqliteStore`] is the production implementation.

mod error;
mod metrics;
mod sqlite;

use std::fmt;
use std::future::Future;

use crate::domain::DepartureRecord;

pub use error::StorageError;
pub use metrics::{LineMetrics, StationMetrics};
pub use sqlite::SqliteStore;

/// What an upsert did to the stored row for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpsertOutcome {
    /// First observation of the key.
    Inserted,
    /// The key existed and at least one observed field changed.
    Updated,
    /// The key existed with identical observed fields.
    Unchanged,
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// Storage used by an ingestion run.
///
/// Upserts are keyed by [`crate::domain::DepartureKey`] and resolve repeated
/// observations last-write-wins. Each call is atomic; concurrent calls for the
/// same key are serialized by the implementation.
pub trait DepartureStore {
    /// Create tables and indexes if missing. Also serves as the reachability
    /// check before a run starts.
    fn init_schema(&self) -> impl Future<Output = Result<(), StorageError>>;

    /// Insert `record`, or overwrite the mutable fields of the existing row.
    fn upsert(
        &self,
        record: &DepartureRecord,
    ) -> impl Future<Output = Result<UpsertOutcome, StorageError>>;
}
