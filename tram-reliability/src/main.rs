use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tram_reliability::config::{DB_MAX_CONNECTIONS, SelectionArgs, Settings};
use tram_reliability::domain::{ALL_PRODUCTS, ProductFilter, Station, StationId};
use tram_reliability::ingest::{BoardSource, DepartureSource, IngestionRun, Poller};
use tram_reliability::mvg::{MockMvgClient, MvgClient};
use tram_reliability::normalize::normalize_board;
use tram_reliability::select::{SelectionCriteria, StationSelector};
use tram_reliability::stations::{
    DEFAULT_GTFS_URL, DEFAULT_LINK_RADIUS_M, GtfsIndexBuilder, GtfsSource, LabelIndex,
    StationCache, StationCatalog, link_stops_from_source,
};
use tram_reliability::store::{DepartureStore, SqliteStore};

/// How many departures `get-departures` prints without `--json`.
const BOARD_PREVIEW: usize = 20;

#[derive(Parser)]
#[command(name = "tram-reliability")]
#[command(about = "Record live departures and compute reliability metrics", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create database tables
    InitDb,
    /// Load station metadata into the cache
    LoadStations {
        /// Refetch even if the cache is fresh
        #[arg(long)]
        refresh: bool,
    },
    /// Copy cached station metadata into the database
    SyncStations,
    /// Print the departure board of one station
    GetDepartures {
        station_id: String,
        /// Print normalized records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one ingestion pass
    Ingest {
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Ingest repeatedly until interrupted
    Poll {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Stop after this many runs
        #[arg(long)]
        runs: Option<u64>,
    },
    /// Print reliability metrics as JSON
    Aggregate {
        #[arg(long, value_enum, default_value_t = Scope::Line)]
        scope: Scope,
    },
    /// Build the label index from a GTFS feed
    BuildLabelIndex {
        /// Feed directory, zip file or URL
        #[arg(long, default_value = DEFAULT_GTFS_URL)]
        gtfs: String,
        #[arg(long, value_delimiter = ',', default_value = ALL_PRODUCTS)]
        products: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
    },
    /// Print the station ids the label index holds for some labels
    PrintLabelStations {
        #[arg(long, value_delimiter = ',', required = true)]
        labels: Vec<String>,
        #[arg(long, value_delimiter = ',', default_value = "TRAM")]
        products: Vec<String>,
    },
    /// Show how GTFS stops named like a query map onto cached stations
    DebugGtfsLink {
        /// Part of the stop name, case-insensitive
        stop_name: String,
        /// Feed directory, zip file or URL
        #[arg(long, default_value = DEFAULT_GTFS_URL)]
        gtfs: String,
        /// Search radius for nearby stations in meters
        #[arg(long = "radius-m", default_value_t = DEFAULT_LINK_RADIUS_M)]
        radius_m: f64,
    },
    /// Print the resolved settings
    ShowConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scope {
    Line,
    Station,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.settings.log_level);

    let settings = &cli.settings;
    match cli.command {
        Command::InitDb => {
            let store = open_store(settings).await?;
            store.init_schema().await?;
            println!("Initialized database at {}", settings.db_url);
        }
        Command::LoadStations { refresh } => {
            let cache = StationCache::new(settings.cache_config());
            let client = MvgClient::new(settings.mvg_config())?;
            let catalog = if refresh {
                StationCatalog::refresh(&cache, &client).await?
            } else {
                StationCatalog::load(&cache, Some(&client)).await?
            };
            let written_at = cache
                .written_at()
                .map_or_else(|| "not written".to_string(), |t| t.to_rfc3339());
            println!(
                "Loaded {} stations ({}, snapshot {written_at})",
                catalog.len(),
                cache.path().display()
            );
        }
        Command::SyncStations => {
            let source = board_source(settings)?;
            let catalog = load_catalog(settings, &source).await?;
            let store = open_store(settings).await?;
            store.init_schema().await?;
            let count = store.sync_stations(catalog.stations()).await?;
            println!("Synced {count} stations to {}", settings.db_url);
        }
        Command::GetDepartures { station_id, json } => {
            let station = StationId::parse(&station_id)?;
            get_departures(settings, &station, json).await?;
        }
        Command::Ingest { selection } => {
            let criteria = selection.to_criteria()?;
            let source = board_source(settings)?;
            let catalog = load_catalog(settings, &source).await?;
            let index = load_label_index(settings, &selection);
            let store = open_store(settings).await?;

            let cancel = CancellationToken::new();
            spawn_shutdown_listener(cancel.clone());

            let summary = IngestionRun::new(&source, &store, &catalog)
                .with_label_index(index.as_ref())
                .with_config(selection.run_config())
                .run(&criteria, &cancel)
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Poll { selection, runs } => {
            let criteria = selection.to_criteria()?;
            let source = board_source(settings)?;
            let catalog = load_catalog(settings, &source).await?;
            let index = load_label_index(settings, &selection);
            let store = open_store(settings).await?;

            let cancel = CancellationToken::new();
            spawn_shutdown_listener(cancel.clone());

            let run = IngestionRun::new(&source, &store, &catalog)
                .with_label_index(index.as_ref())
                .with_config(selection.run_config());
            let config = settings.poller_config(runs);
            info!(
                db = %settings.db_url,
                interval_secs = config.interval.as_secs(),
                products = ?selection.products,
                labels = ?selection.labels,
                "starting poller"
            );

            let report = Poller::new(run, criteria, config)
                .run(&cancel)
                .await;
            println!("Completed {} runs ({} failed)", report.runs, report.failed_runs);
        }
        Command::Aggregate { scope } => {
            let store = open_store(settings).await?;
            store.init_schema().await?;
            let json = match scope {
                Scope::Line => serde_json::to_string_pretty(&store.line_metrics().await?)?,
                Scope::Station => serde_json::to_string_pretty(&store.station_metrics().await?)?,
            };
            println!("{json}");
        }
        Command::BuildLabelIndex {
            gtfs,
            products,
            labels,
        } => {
            let source = board_source(settings)?;
            let catalog = load_catalog(settings, &source).await?;
            let gtfs = GtfsSource::parse(&gtfs);

            let index = GtfsIndexBuilder::new(&catalog)
                .with_products(ProductFilter::from_tags(&products))
                .with_labels(&labels)
                .build(&gtfs)
                .await?;
            index.save(&settings.label_index)?;

            let labels = index.labels(ALL_PRODUCTS).count();
            println!(
                "Indexed {labels} labels from {gtfs} into {}",
                settings.label_index.display()
            );
        }
        Command::PrintLabelStations { labels, products } => {
            let index = LabelIndex::load(&settings.label_index)?;
            let catalog = StationCatalog::default();
            let criteria = SelectionCriteria::new()
                .with_products(ProductFilter::from_tags(&products))
                .with_labels(&labels)
                .with_label_index(true);

            let selection = StationSelector::new(&catalog, Some(&index)).select(&criteria)?;
            for (product, label) in &selection.index_misses {
                warn!(product = %product, label = %label, "not in label index");
            }
            for id in &selection.station_ids {
                println!("{id}");
            }
        }
        Command::DebugGtfsLink {
            stop_name,
            gtfs,
            radius_m,
        } => {
            let source = board_source(settings)?;
            let catalog = load_catalog(settings, &source).await?;
            let gtfs = GtfsSource::parse(&gtfs);

            let report = link_stops_from_source(&gtfs, &catalog, &stop_name, radius_m).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(settings)?);
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_store(settings: &Settings) -> Result<SqliteStore> {
    SqliteStore::connect(&settings.db_url, DB_MAX_CONNECTIONS)
        .await
        .with_context(|| format!("failed to open database {}", settings.db_url))
}

fn board_source(settings: &Settings) -> Result<BoardSource> {
    match &settings.mock_dir {
        Some(dir) => {
            let mock = MockMvgClient::new(dir)
                .with_context(|| format!("failed to load mock boards from {}", dir.display()))?;
            info!(stations = mock.available_stations().len(), "serving mock departures");
            Ok(BoardSource::Mock(mock))
        }
        None => Ok(BoardSource::Live(MvgClient::new(settings.mvg_config())?)),
    }
}

/// Load the station catalog. Mock runs without a cache fall back to one
/// station per mock board.
async fn load_catalog(settings: &Settings, source: &BoardSource) -> Result<StationCatalog> {
    let cache = StationCache::new(settings.cache_config());
    match source {
        BoardSource::Live(client) => Ok(StationCatalog::load(&cache, Some(client)).await?),
        BoardSource::Mock(mock) => match StationCatalog::load(&cache, None).await {
            Ok(catalog) => Ok(catalog),
            Err(err) => {
                warn!(error = %err, "no station cache, using mock board ids as catalog");
                let stations = mock.available_stations().into_iter().map(|id| {
                    let name = id.to_string();
                    Station::new(id, name, std::iter::empty::<&str>())
                });
                Ok(StationCatalog::new(stations))
            }
        },
    }
}

/// The label index, when the selection asks for one.
///
/// A missing or unreadable index is not an error here; the run reports it
/// once selection needs the index.
fn load_label_index(settings: &Settings, selection: &SelectionArgs) -> Option<LabelIndex> {
    if !selection.use_label_index {
        return None;
    }
    match LabelIndex::load(&settings.label_index) {
        Ok(index) => Some(index),
        Err(err) => {
            warn!(error = %err, path = %settings.label_index.display(), "label index unavailable");
            None
        }
    }
}

async fn get_departures(settings: &Settings, station: &StationId, json: bool) -> Result<()> {
    let source = board_source(settings)?;
    let board = source.fetch(station).await?;
    let normalized = normalize_board(station, &board, Utc::now(), None);

    if json {
        println!("{}", serde_json::to_string_pretty(&normalized.records)?);
        return Ok(());
    }

    for record in normalized.records.iter().take(BOARD_PREVIEW) {
        let delay = record
            .delay_minutes
            .map_or_else(|| "?".to_string(), |d| d.to_string());
        let realtime = record
            .realtime_departure
            .map_or_else(|| "-".to_string(), |t| t.format("%H:%M").to_string());
        println!(
            "{} to {} | planned={} real={} delay={} cancelled={}",
            record.key.label,
            record.key.destination,
            record.key.planned_departure.format("%Y-%m-%d %H:%M"),
            realtime,
            delay,
            record.cancelled
        );
    }
    if normalized.skipped > 0 {
        println!("({} malformed entries skipped)", normalized.skipped);
    }
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(err) => {
                    warn!(error = %err, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
        info!("shutdown requested, finishing in-flight work");
        token.cancel();
    });
}
