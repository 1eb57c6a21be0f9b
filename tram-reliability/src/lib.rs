//! Tram departure reliability tracker.
//!
//! Polls live departure boards for a selected set of stations and records
//! every observed departure in SQLite, keyed so that repeated observations of
//! the same scheduled departure update one row. The stored history feeds
//! simple punctuality and cancellation metrics.

pub mod config;
pub mod domain;
pub mod ingest;
pub mod mvg;
pub mod normalize;
pub mod select;
pub mod stations;
pub mod store;
