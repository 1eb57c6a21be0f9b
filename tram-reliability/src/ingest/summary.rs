//! Per-station outcomes and the run summary.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::domain::StationId;
use crate::mvg::ApiError;
use crate::store::UpsertOutcome;

/// Why a station failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Connection,
    /// Non-success HTTP status.
    Status,
    /// Body was not a departures payload.
    Parse,
    /// Writing records failed.
    Storage,
}

impl From<&ApiError> for FailureKind {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Timeout => FailureKind::Timeout,
            ApiError::Connection(_) => FailureKind::Connection,
            ApiError::Status { .. } => FailureKind::Status,
            ApiError::Payload { .. } => FailureKind::Parse,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::Status => "status",
            FailureKind::Parse => "parse",
            FailureKind::Storage => "storage",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationFailure {
    pub station: StationId,
    pub kind: FailureKind,
    pub message: String,
}

/// Entry and record counts for one station's board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StationCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub filtered: usize,
    pub duplicates: usize,
}

impl StationCounts {
    pub fn add_outcome(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationStatus {
    Succeeded,
    Failed(StationFailure),
    /// Abandoned because the run was cancelled.
    Cancelled,
}

/// What happened to one station during a run.
///
/// Counts are kept even for failed or cancelled stations, covering whatever
/// was written before the pipeline stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationOutcome {
    pub station: StationId,
    pub counts: StationCounts,
    pub status: StationStatus,
}

impl StationOutcome {
    pub fn new(station: StationId) -> Self {
        Self {
            station,
            counts: StationCounts::default(),
            status: StationStatus::Succeeded,
        }
    }

    pub(crate) fn failed(mut self, kind: FailureKind, message: impl Into<String>) -> Self {
        self.status = StationStatus::Failed(StationFailure {
            station: self.station.clone(),
            kind,
            message: message.into(),
        });
        self
    }

    pub(crate) fn cancelled(mut self) -> Self {
        self.status = StationStatus::Cancelled;
        self
    }
}

/// Result of one ingestion run. Logged, then discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub stations_attempted: usize,
    pub stations_succeeded: usize,
    pub stations_failed: usize,
    pub stations_cancelled: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub records_unchanged: usize,
    pub entries_skipped: usize,
    pub entries_filtered: usize,
    pub entries_duplicate: usize,
    pub failures: Vec<StationFailure>,
    /// Station names that did not resolve.
    pub unknown_names: Vec<String>,
    /// `(product, label)` pairs missing from the label index.
    pub index_misses: Vec<(String, String)>,
    pub duration: Duration,
}

impl RunSummary {
    /// Fold one station's outcome into the totals.
    pub fn record(&mut self, outcome: StationOutcome) {
        self.stations_attempted += 1;

        let counts = outcome.counts;
        self.records_inserted += counts.inserted;
        self.records_updated += counts.updated;
        self.records_unchanged += counts.unchanged;
        self.entries_skipped += counts.skipped;
        self.entries_filtered += counts.filtered;
        self.entries_duplicate += counts.duplicates;

        match outcome.status {
            StationStatus::Succeeded => self.stations_succeeded += 1,
            StationStatus::Failed(failure) => {
                self.stations_failed += 1;
                self.failures.push(failure);
            }
            StationStatus::Cancelled => self.stations_cancelled += 1,
        }
    }

    /// Rows inserted or changed.
    pub fn records_written(&self) -> usize {
        self.records_inserted + self.records_updated
    }

    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, usize> {
        let mut by_kind = BTreeMap::new();
        for failure in &self.failures {
            *by_kind.entry(failure.kind).or_insert(0) += 1;
        }
        by_kind
    }

    pub fn was_cancelled(&self) -> bool {
        self.stations_cancelled > 0
    }

    /// Emit the summary as one structured log line.
    pub fn log(&self) {
        let by_kind = self
            .failures_by_kind()
            .iter()
            .map(|(kind, n)| format!("{kind}={n}"))
            .collect::<Vec<_>>()
            .join(",");

        info!(
            attempted = self.stations_attempted,
            succeeded = self.stations_succeeded,
            failed = self.stations_failed,
            cancelled = self.stations_cancelled,
            inserted = self.records_inserted,
            updated = self.records_updated,
            unchanged = self.records_unchanged,
            skipped = self.entries_skipped,
            filtered = self.entries_filtered,
            duplicates = self.entries_duplicate,
            failures = %by_kind,
            duration_ms = self.duration.as_millis() as u64,
            "ingestion run complete"
        );
    }
}
