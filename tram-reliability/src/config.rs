//! Command-line and environment configuration.
//!
//! Every setting can come from a flag, a `TTR_*` environment variable (a
//! `.env` file is loaded first), or its default, in that order of
//! precedence. The library never reads the environment itself; these structs
//! are turned into the plain config values the library takes.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use serde::Serialize;

use crate::domain::{ProductFilter, StationId};
use crate::ingest::{DEFAULT_MAX_WORKERS, PollerConfig, RunConfig};
use crate::mvg::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, MvgConfig};
use crate::select::SelectionCriteria;
use crate::stations::StationCacheConfig;

/// Connections in the SQLite pool. Enough for the default worker count.
pub const DB_MAX_CONNECTIONS: u32 = 8;

/// Process-wide settings.
#[derive(Debug, Clone, Args, Serialize)]
pub struct Settings {
    /// Database URL
    #[arg(long, env = "TTR_DB_URL", default_value = "sqlite://data/reliability.db", global = true)]
    pub db_url: String,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "TTR_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Station metadata cache file
    #[arg(long, env = "TTR_STATIONS_CACHE", default_value = "data/stations.json", global = true)]
    pub stations_cache: PathBuf,

    /// Hours before the station cache is refreshed
    #[arg(long, env = "TTR_STATIONS_CACHE_TTL_HOURS", default_value_t = 24, global = true)]
    pub stations_cache_ttl_hours: u64,

    /// Label index file
    #[arg(long, env = "TTR_LABEL_INDEX", default_value = "data/label_index.json", global = true)]
    pub label_index: PathBuf,

    /// Base URL of the departures API
    #[arg(long, env = "TTR_API_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub api_base_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "TTR_REQUEST_TIMEOUT_SECONDS", default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    pub request_timeout_secs: u64,

    /// Seconds between the starts of two polling runs
    #[arg(long, env = "TTR_POLLING_INTERVAL_SECONDS", default_value_t = 300, global = true)]
    pub poll_interval_secs: u64,

    /// Serve departures from `<station id>.json` files in this directory
    #[arg(long, env = "TTR_MOCK_DIR", global = true)]
    pub mock_dir: Option<PathBuf>,
}

impl Settings {
    pub fn mvg_config(&self) -> MvgConfig {
        MvgConfig::new()
            .with_base_url(&self.api_base_url)
            .with_timeout(self.request_timeout_secs)
    }

    pub fn cache_config(&self) -> StationCacheConfig {
        StationCacheConfig::new(&self.stations_cache)
            .with_ttl(Duration::from_secs(self.stations_cache_ttl_hours * 3600))
    }

    pub fn poller_config(&self, max_runs: Option<u64>) -> PollerConfig {
        PollerConfig::new()
            .with_interval(Duration::from_secs(self.poll_interval_secs))
            .with_max_runs(max_runs)
    }
}

/// One or more `--station-ids` entries are not valid ids.
///
/// Reported instead of dropping them, since an empty id list would widen the
/// run to the product filter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid station ids: {}", .ids.join(", "))]
pub struct InvalidStationIds {
    pub ids: Vec<String>,
}

/// Which stations and lines a run covers.
#[derive(Debug, Clone, Args, Serialize)]
pub struct SelectionArgs {
    /// Product tags (TRAM, UBAHN, SBAHN, BUS or ALL)
    #[arg(long, env = "TTR_PRODUCTS", value_delimiter = ',', default_value = "ALL")]
    pub products: Vec<String>,

    /// Line labels to keep, e.g. 27,N27
    #[arg(long, env = "TTR_LABELS", value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Station display names
    #[arg(long = "station-names", env = "TTR_STATION_NAMES", value_delimiter = ',')]
    pub station_names: Vec<String>,

    /// Station ids; take precedence over names
    #[arg(long = "station-ids", env = "TTR_STATION_IDS", value_delimiter = ',')]
    pub station_ids: Vec<String>,

    /// Resolve labels to stations through the label index
    #[arg(long, env = "TTR_USE_LABEL_INDEX")]
    pub use_label_index: bool,

    /// Stations fetched concurrently
    #[arg(long, env = "TTR_MAX_WORKERS", default_value_t = DEFAULT_MAX_WORKERS)]
    pub max_workers: usize,
}

impl SelectionArgs {
    /// Build selection criteria. Blank list entries are ignored; any other
    /// unparseable id fails the whole selection.
    pub fn to_criteria(&self) -> Result<SelectionCriteria, InvalidStationIds> {
        let mut ids = Vec::new();
        let mut invalid = Vec::new();
        for raw in self.station_ids.iter().filter(|s| !s.trim().is_empty()) {
            match StationId::parse(raw) {
                Ok(id) => ids.push(id),
                Err(_) => invalid.push(raw.trim().to_string()),
            }
        }
        if !invalid.is_empty() {
            return Err(InvalidStationIds { ids: invalid });
        }

        Ok(SelectionCriteria::new()
            .with_products(ProductFilter::from_tags(&self.products))
            .with_labels(&self.labels)
            .with_names(&self.station_names)
            .with_ids(ids)
            .with_label_index(self.use_label_index))
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig::new().with_max_workers(self.max_workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        settings: Settings,
        #[command(flatten)]
        selection: SelectionArgs,
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ttr").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.settings.stations_cache_ttl_hours, 24);
        assert_eq!(cli.settings.request_timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cli.selection.products, vec!["ALL".to_string()]);
        assert_eq!(cli.selection.max_workers, DEFAULT_MAX_WORKERS);

        let criteria = cli.selection.to_criteria().unwrap();
        assert_eq!(criteria.products, ProductFilter::All);
        assert!(criteria.label_filter().is_none());
    }

    #[test]
    fn comma_separated_lists() {
        let cli = parse(&[
            "--products",
            "tram,bus",
            "--labels",
            " 27 ,n27",
            "--station-ids",
            "de:09162:6, ,de:09162:70",
            "--use-label-index",
        ]);

        let criteria = cli.selection.to_criteria().unwrap();
        assert_eq!(criteria.products, ProductFilter::from_tags(["TRAM", "BUS"]));
        assert!(criteria.labels.contains("27"));
        assert!(criteria.labels.contains("N27"));
        assert_eq!(criteria.explicit_ids.len(), 2);
        assert!(criteria.use_label_index);
    }

    #[test]
    fn malformed_station_id_rejects_selection() {
        let cli = parse(&["--station-ids", "de:09162 1"]);
        assert_eq!(
            cli.selection.to_criteria(),
            Err(InvalidStationIds {
                ids: vec!["de:09162 1".to_string()]
            })
        );

        let cli = parse(&["--station-ids", "de:09162:6,de:09162 1,de 2"]);
        let err = cli.selection.to_criteria().unwrap_err();
        assert_eq!(err.ids, vec!["de:09162 1".to_string(), "de 2".to_string()]);
        assert_eq!(err.to_string(), "invalid station ids: de:09162 1, de 2");
    }

    #[test]
    fn derived_configs() {
        let cli = parse(&[
            "--stations-cache-ttl-hours",
            "2",
            "--poll-interval-secs",
            "60",
            "--max-workers",
            "0",
        ]);

        assert_eq!(cli.settings.cache_config().ttl, Duration::from_secs(7200));
        let poller = cli.settings.poller_config(Some(3));
        assert_eq!(poller.interval, Duration::from_secs(60));
        assert_eq!(poller.max_runs, Some(3));
        assert_eq!(cli.selection.run_config().max_workers, 1);
    }

    #[test]
    fn settings_serialize_for_display() {
        let cli = parse(&["--db-url", "sqlite://tmp/x.db"]);
        let json = serde_json::to_value(&cli.settings).unwrap();
        assert_eq!(json["db_url"], "sqlite://tmp/x.db");
        assert!(json["mock_dir"].is_null());
    }
}
