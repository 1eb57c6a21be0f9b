//! The ingestion engine.
//!
//! An [`IngestionRun`] selects stations, then fans out
//! fetch → normalize → record across a bounded number of in-flight
//! stations. A failing station is recorded in the [`RunSummary`] and never
//! aborts the run. The [`Poller`] repeats runs on a fixed cadence until
//! cancelled.

mod config;
mod error;
mod poller;
mod run;
mod source;
mod summary;

pub use config::{DEFAULT_MAX_WORKERS, DEFAULT_POLL_INTERVAL, PollerConfig, RunConfig};
pub use error::RunError;
pub use poller::{Poller, PollerReport, PollerState};
pub use run::IngestionRun;
pub use source::{BoardSource, DepartureSource};
pub use summary::{
    FailureKind, RunSummary, StationCounts, StationFailure, StationOutcome, StationStatus,
};
