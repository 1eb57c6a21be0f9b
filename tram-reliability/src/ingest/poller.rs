//! Timed loop around [`IngestionRun`].
//!
//! ```text
//! Idle -> Running -> Sleeping -> Running -> ... -> Stopped
//! ```
//!
//! Cancellation is the only way out apart from `max_runs`: failed runs are
//! logged and the loop carries on.

use std::time::Instant;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use crate::select::SelectionCriteria;
use crate::store::DepartureStore;

use super::config::PollerConfig;
use super::run::IngestionRun;
use super::source::DepartureSource;
use super::summary::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    Sleeping,
    Stopped,
}

/// What the poller did before stopping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollerReport {
    pub runs: u64,
    pub failed_runs: u64,
    pub last_summary: Option<RunSummary>,
}

pub struct Poller<'a, S, D> {
    run: IngestionRun<'a, S, D>,
    criteria: SelectionCriteria,
    config: PollerConfig,
    state: watch::Sender<PollerState>,
}

impl<'a, S, D> Poller<'a, S, D>
where
    S: DepartureSource,
    D: DepartureStore,
{
    pub fn new(
        run: IngestionRun<'a, S, D>,
        criteria: SelectionCriteria,
        config: PollerConfig,
    ) -> Self {
        let (state, _) = watch::channel(PollerState::Idle);
        Self {
            run,
            criteria,
            config,
            state,
        }
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    fn transition(&self, next: PollerState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            trace!(?prev, ?next, "poller state");
        }
    }

    /// Run until `cancel` fires or `max_runs` is reached.
    pub async fn run(&self, cancel: &CancellationToken) -> PollerReport {
        let mut report = PollerReport::default();
        let mut consecutive_failures: u32 = 0;

        while !cancel.is_cancelled() {
            self.transition(PollerState::Running);
            let started = Instant::now();

            match self.run.run(&self.criteria, cancel).await {
                Ok(summary) => {
                    consecutive_failures = 0;
                    report.last_summary = Some(summary);
                }
                Err(err) => {
                    consecutive_failures += 1;
                    report.failed_runs += 1;
                    error!(error = %err, consecutive_failures, "ingestion run failed");
                }
            }
            report.runs += 1;

            if self.config.max_runs.is_some_and(|max| report.runs >= max) {
                info!(runs = report.runs, "reached run limit");
                break;
            }
            if cancel.is_cancelled() {
                break;
            }

            self.transition(PollerState::Sleeping);
            let pause = self.config.interval.saturating_sub(started.elapsed());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self.transition(PollerState::Stopped);
        info!(runs = report.runs, failed = report.failed_runs, "poller stopped");
        report
    }
}
