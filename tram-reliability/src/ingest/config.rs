//! Run and poller configuration.

use std::time::Duration;

/// Default number of stations processed concurrently.
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Default time between the starts of two runs.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Configuration for a single ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Maximum number of stations in flight at once. Never below 1.
    pub max_workers: usize,
}

impl RunConfig {
    pub fn new() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n.max(1);
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Cadence of runs. The sleep after a run is this minus the run's duration.
    pub interval: Duration,
    /// Stop after this many runs. `None` runs until cancelled.
    pub max_runs: Option<u64>,
}

impl PollerConfig {
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_runs: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_runs(mut self, runs: Option<u64>) -> Self {
        self.max_runs = runs;
        self
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(RunConfig::default().max_workers, 8);
        let poller = PollerConfig::default();
        assert_eq!(poller.interval, Duration::from_secs(300));
        assert_eq!(poller.max_runs, None);
    }

    #[test]
    fn max_workers_never_zero() {
        assert_eq!(RunConfig::new().with_max_workers(0).max_workers, 1);
        assert_eq!(RunConfig::new().with_max_workers(3).max_workers, 3);
    }
}
