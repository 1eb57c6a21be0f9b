//! Build a [`LabelIndex`] from a GTFS feed.
//!
//! routes → trips → stop_times → stops, then stop ids are matched to catalog
//! stations by their first three id segments. Each label lands under its
//! product and under `ALL`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::domain::{ALL_PRODUCTS, ProductFilter, StationId, normalize_label};

use super::catalog::StationCatalog;
use super::error::StationError;
use super::label_index::LabelIndex;

/// The MVG GTFS feed.
pub const DEFAULT_GTFS_URL: &str = "https://www.mvg.de/static/gtfs/google_transit.zip";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Map a GTFS `route_type` to a product tag.
///
/// 900 is the extended type MVG uses for regular tram routes.
pub fn product_for_route_type(route_type: &str) -> Option<&'static str> {
    match route_type.trim() {
        "0" | "900" => Some("TRAM"),
        "1" => Some("UBAHN"),
        "2" => Some("SBAHN"),
        "3" => Some("BUS"),
        _ => None,
    }
}

/// Where a feed lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GtfsSource {
    /// An unpacked feed directory.
    Dir(PathBuf),
    /// A local zip file.
    Zip(PathBuf),
    /// An http(s) URL to a zip file.
    Url(String),
}

impl GtfsSource {
    /// Classify a location: URLs by scheme, directories by what is on disk,
    /// anything else is taken as a zip path.
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            return GtfsSource::Url(location.to_string());
        }

        let path = PathBuf::from(location);
        if path.is_dir() {
            GtfsSource::Dir(path)
        } else {
            GtfsSource::Zip(path)
        }
    }

    /// Open the feed, downloading it first for URLs.
    pub async fn open(&self) -> Result<Feed, StationError> {
        match self {
            GtfsSource::Dir(path) => Ok(Feed::Dir(path.clone())),
            GtfsSource::Zip(path) => {
                let bytes = std::fs::read(path).map_err(|e| StationError::Feed {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                Feed::from_zip_bytes(bytes)
            }
            GtfsSource::Url(url) => {
                let bytes = download(url).await?;
                info!(url = %url, kb = bytes.len() / 1024, "downloaded GTFS feed");
                Feed::from_zip_bytes(bytes)
            }
        }
    }
}

impl std::fmt::Display for GtfsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GtfsSource::Dir(path) | GtfsSource::Zip(path) => write!(f, "{}", path.display()),
            GtfsSource::Url(url) => f.write_str(url),
        }
    }
}

async fn download(url: &str) -> Result<Vec<u8>, StationError> {
    let feed_err = |e: reqwest::Error| StationError::Feed {
        message: format!("failed to download {url}: {e}"),
    };

    let client = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(feed_err)?;

    let response = client.get(url).send().await.map_err(feed_err)?;
    let status = response.status();
    if !status.is_success() {
        return Err(StationError::Feed {
            message: format!("download of {url} failed with status {status}"),
        });
    }

    let bytes = response.bytes().await.map_err(feed_err)?;
    Ok(bytes.to_vec())
}

/// An opened feed whose `.txt` tables can be read one at a time.
pub enum Feed {
    Dir(PathBuf),
    Archive(ZipArchive<Cursor<Vec<u8>>>),
}

impl Feed {
    pub fn from_zip_bytes(bytes: Vec<u8>) -> Result<Self, StationError> {
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| StationError::Feed {
            message: format!("failed to open GTFS zip archive: {e}"),
        })?;
        Ok(Feed::Archive(archive))
    }

    fn open_table(&mut self, name: &str) -> Result<Box<dyn Read + '_>, StationError> {
        match self {
            Feed::Dir(dir) => {
                let path = dir.join(name);
                let file = File::open(&path).map_err(|e| StationError::Feed {
                    message: format!("failed to open {}: {e}", path.display()),
                })?;
                Ok(Box::new(file))
            }
            Feed::Archive(archive) => {
                let file = archive.by_name(name).map_err(|e| StationError::Feed {
                    message: format!("{name} not found in GTFS archive: {e}"),
                })?;
                Ok(Box::new(file))
            }
        }
    }

    /// Stream the rows of one table through `f`.
    ///
    /// Rows that do not deserialize are skipped; the count is returned.
    pub(super) fn for_each_row<T, F>(&mut self, name: &str, mut f: F) -> Result<usize, StationError>
    where
        T: DeserializeOwned,
        F: FnMut(T),
    {
        let reader = self.open_table(name)?;
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        // Some feeds ship a UTF-8 BOM in front of the first header.
        let headers: csv::StringRecord = rdr
            .headers()
            .map_err(|e| StationError::Feed {
                message: format!("failed to read {name} header: {e}"),
            })?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim())
            .collect();
        rdr.set_headers(headers);

        let mut skipped = 0;
        for row in rdr.deserialize::<T>() {
            match row {
                Ok(row) => f(row),
                Err(e) => {
                    skipped += 1;
                    if skipped == 1 {
                        debug!(table = name, error = %e, "skipping malformed GTFS row");
                    }
                }
            }
        }
        Ok(skipped)
    }
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    #[serde(default)]
    route_id: String,
    #[serde(default)]
    route_short_name: String,
    #[serde(default)]
    route_type: String,
}

#[derive(Debug, Deserialize)]
struct TripRow {
    #[serde(default)]
    route_id: String,
    #[serde(default)]
    trip_id: String,
}

#[derive(Debug, Deserialize)]
struct StopTimeRow {
    #[serde(default)]
    trip_id: String,
    #[serde(default)]
    stop_id: String,
}

#[derive(Debug, Deserialize)]
struct StopRow {
    #[serde(default)]
    stop_id: String,
    #[serde(default)]
    parent_station: String,
}

/// Builds a label index from a feed against a station catalog.
#[derive(Debug, Clone)]
pub struct GtfsIndexBuilder<'a> {
    catalog: &'a StationCatalog,
    products: ProductFilter,
    labels: Option<BTreeSet<String>>,
}

impl<'a> GtfsIndexBuilder<'a> {
    pub fn new(catalog: &'a StationCatalog) -> Self {
        Self {
            catalog,
            products: ProductFilter::All,
            labels: None,
        }
    }

    /// Only index routes of these products.
    pub fn with_products(mut self, products: ProductFilter) -> Self {
        self.products = products;
        self
    }

    /// Only index these labels. An empty set means all labels.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let labels: BTreeSet<String> = labels
            .into_iter()
            .map(|l| normalize_label(l.as_ref()))
            .filter(|l| !l.is_empty())
            .collect();
        self.labels = (!labels.is_empty()).then_some(labels);
        self
    }

    /// Open `source` and build the index.
    pub async fn build(&self, source: &GtfsSource) -> Result<LabelIndex, StationError> {
        let mut feed = source.open().await?;
        self.build_from_feed(&mut feed, &source.to_string())
    }

    /// Build the index from an already opened feed.
    pub fn build_from_feed(
        &self,
        feed: &mut Feed,
        source: &str,
    ) -> Result<LabelIndex, StationError> {
        // route_id -> (product, label)
        let mut routes: HashMap<String, (&'static str, String)> = HashMap::new();
        feed.for_each_row("routes.txt", |row: RouteRow| {
            let Some(product) = product_for_route_type(&row.route_type) else {
                return;
            };
            let label = normalize_label(&row.route_short_name);
            if row.route_id.is_empty() || label.is_empty() {
                return;
            }
            if !self.products.matches(&BTreeSet::from([product.to_string()])) {
                return;
            }
            if let Some(wanted) = &self.labels
                && !wanted.contains(&label)
            {
                return;
            }
            routes.insert(row.route_id, (product, label));
        })?;

        let mut trip_routes: HashMap<String, String> = HashMap::new();
        feed.for_each_row("trips.txt", |row: TripRow| {
            if !row.trip_id.is_empty() && routes.contains_key(&row.route_id) {
                trip_routes.insert(row.trip_id, row.route_id);
            }
        })?;

        // stop_times is by far the largest table; only keep rows of selected trips.
        let mut route_stops: HashMap<&str, HashSet<String>> = HashMap::new();
        feed.for_each_row("stop_times.txt", |row: StopTimeRow| {
            if row.stop_id.is_empty() {
                return;
            }
            if let Some(route_id) = trip_routes.get(&row.trip_id) {
                route_stops
                    .entry(route_id.as_str())
                    .or_default()
                    .insert(row.stop_id);
            }
        })?;

        let mut parents: HashMap<String, String> = HashMap::new();
        feed.for_each_row("stops.txt", |row: StopRow| {
            let parent = row.parent_station.trim();
            if !row.stop_id.is_empty() && !parent.is_empty() {
                parents.insert(row.stop_id, parent.to_string());
            }
        })?;

        let mut index = LabelIndex::new(source);
        for (route_id, (product, label)) in &routes {
            let stations: BTreeSet<StationId> = route_stops
                .get(route_id.as_str())
                .into_iter()
                .flatten()
                .filter_map(|stop_id| {
                    let stop_id = parents.get(stop_id).unwrap_or(stop_id);
                    self.catalog.match_stop_id(stop_id).cloned()
                })
                .collect();

            index.insert(product, label, stations.iter().cloned());
            index.insert(ALL_PRODUCTS, label, stations);
        }

        info!(
            routes = routes.len(),
            trips = trip_routes.len(),
            source,
            "built label index"
        );
        Ok(index)
    }
}
