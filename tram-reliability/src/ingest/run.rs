//! One ingestion pass: select, then fetch, normalize and record per station.

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::StationId;
use crate::normalize::normalize_board;
use crate::select::{SelectionCriteria, StationSelector};
use crate::stations::{LabelIndex, StationCatalog};
use crate::store::DepartureStore;

use super::config::RunConfig;
use super::error::RunError;
use super::source::DepartureSource;
use super::summary::{FailureKind, RunSummary, StationOutcome, StationStatus};

/// Orchestrates a single ingestion pass.
///
/// Holds borrowed snapshots of the catalog and label index, so a run always
/// sees one consistent view of station metadata.
pub struct IngestionRun<'a, S, D> {
    source: &'a S,
    store: &'a D,
    catalog: &'a StationCatalog,
    index: Option<&'a LabelIndex>,
    config: RunConfig,
}

impl<'a, S, D> IngestionRun<'a, S, D>
where
    S: DepartureSource,
    D: DepartureStore,
{
    pub fn new(source: &'a S, store: &'a D, catalog: &'a StationCatalog) -> Self {
        Self {
            source,
            store,
            catalog,
            index: None,
            config: RunConfig::default(),
        }
    }

    pub fn with_label_index(mut self, index: Option<&'a LabelIndex>) -> Self {
        self.index = index;
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one pass.
    ///
    /// Fails only when storage is unreachable or the selection itself cannot
    /// be made, both before any fetch starts. Station-level failures are
    /// recorded in the summary.
    pub async fn run(
        &self,
        criteria: &SelectionCriteria,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let started = Instant::now();

        self.store.init_schema().await?;
        let selection = StationSelector::new(self.catalog, self.index).select(criteria)?;

        let mut summary = RunSummary::default();
        if let Some(unknown) = selection.unknown {
            warn!(error = %unknown, "some station names did not resolve");
            summary.unknown_names = unknown.names;
        }
        if !selection.index_misses.is_empty() {
            warn!(
                misses = selection.index_misses.len(),
                "label index has no entry for some (product, label) pairs"
            );
        }
        summary.index_misses = selection.index_misses;

        info!(
            stations = selection.station_ids.len(),
            source = %selection.source,
            max_workers = self.config.max_workers,
            "starting ingestion run"
        );

        let labels = criteria.label_filter();
        let mut outcomes = stream::iter(selection.station_ids.iter())
            .map(|station| self.process_station(station, labels, cancel))
            .buffer_unordered(self.config.max_workers);

        while let Some(outcome) = outcomes.next().await {
            if let StationStatus::Failed(failure) = &outcome.status {
                warn!(
                    station = %failure.station,
                    kind = %failure.kind,
                    error = %failure.message,
                    "station failed"
                );
            }
            summary.record(outcome);
        }

        summary.duration = started.elapsed();
        summary.log();
        Ok(summary)
    }

    async fn process_station(
        &self,
        station: &StationId,
        labels: Option<&BTreeSet<String>>,
        cancel: &CancellationToken,
    ) -> StationOutcome {
        let mut outcome = StationOutcome::new(station.clone());
        if cancel.is_cancelled() {
            return outcome.cancelled();
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return outcome.cancelled(),
            fetched = self.source.fetch(station) => fetched,
        };

        let board = match fetched {
            Ok(board) => board,
            Err(err) => {
                let kind = FailureKind::from(&err.source);
                return outcome.failed(kind, err.source.to_string());
            }
        };

        let normalized = normalize_board(station, &board, Utc::now(), labels);
        outcome.counts.skipped = normalized.skipped;
        outcome.counts.filtered = normalized.filtered;
        outcome.counts.duplicates = normalized.duplicates;

        for record in &normalized.records {
            if cancel.is_cancelled() {
                return outcome.cancelled();
            }
            match self.store.upsert(record).await {
                Ok(result) => outcome.counts.add_outcome(result),
                Err(err) => return outcome.failed(FailureKind::Storage, err.to_string()),
            }
        }

        debug!(
            station = %station,
            entries = board.len(),
            inserted = outcome.counts.inserted,
            updated = outcome.counts.updated,
            "station done"
        );
        outcome
    }
}
