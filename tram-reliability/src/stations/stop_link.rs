//! Diagnose how GTFS stops line up with catalog stations.
//!
//! When a label resolves to fewer stations than expected, the usual cause is
//! a feed stop whose id (or parent id) does not match any catalog station.
//! [`link_stops`] shows, for every stop whose name contains a query, whether
//! the ids match and which catalog stations lie close by.

use serde::{Deserialize, Serialize};

use crate::domain::StationId;

use super::catalog::StationCatalog;
use super::error::StationError;
use super::gtfs::{Feed, GtfsSource};

pub const DEFAULT_LINK_RADIUS_M: f64 = 300.0;

/// Nearby stations listed per stop.
const MAX_NEARBY: usize = 10;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two WGS84 points.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyStation {
    /// Rounded to 0.1 m.
    pub distance_m: f64,
    pub station_id: StationId,
    pub station_name: String,
}

/// One feed stop and how it relates to the catalog.
///
/// Ids count as "in cache" when their first three segments name a catalog
/// station, which is the rule the label index links stops by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopLink {
    pub gtfs_stop_id: String,
    pub gtfs_stop_name: String,
    pub gtfs_parent_station: Option<String>,
    pub direct_id_in_cache: bool,
    pub parent_id_in_cache: bool,
    pub nearest_mvg_within_radius: Vec<NearbyStation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopLinkReport {
    pub query: String,
    pub radius_m: f64,
    pub matches: Vec<StopLink>,
}

#[derive(Debug, Deserialize)]
struct StopLinkRow {
    #[serde(default)]
    stop_id: String,
    #[serde(default)]
    stop_name: String,
    #[serde(default)]
    stop_lat: String,
    #[serde(default)]
    stop_lon: String,
    #[serde(default)]
    parent_station: String,
}

struct FeedStop {
    id: String,
    name: String,
    lat: f64,
    lon: f64,
    parent: Option<String>,
}

impl FeedStop {
    /// Stops without an id, a name or parseable coordinates are dropped.
    fn from_row(row: StopLinkRow) -> Option<Self> {
        let id = row.stop_id.trim();
        let name = row.stop_name.trim();
        if id.is_empty() || name.is_empty() {
            return None;
        }
        let lat = row.stop_lat.trim().parse::<f64>().ok()?;
        let lon = row.stop_lon.trim().parse::<f64>().ok()?;
        let parent = row.parent_station.trim();

        Some(Self {
            id: id.to_string(),
            name: name.to_string(),
            lat,
            lon,
            parent: (!parent.is_empty()).then(|| parent.to_string()),
        })
    }
}

/// Open `source` and link the stops matching `query`.
pub async fn link_stops_from_source(
    source: &GtfsSource,
    catalog: &StationCatalog,
    query: &str,
    radius_m: f64,
) -> Result<StopLinkReport, StationError> {
    let mut feed = source.open().await?;
    link_stops(&mut feed, catalog, query, radius_m)
}

/// Every feed stop whose name contains `query` (case-insensitive), with its
/// id matches and the catalog stations within `radius_m`, nearest first.
pub fn link_stops(
    feed: &mut Feed,
    catalog: &StationCatalog,
    query: &str,
    radius_m: f64,
) -> Result<StopLinkReport, StationError> {
    let needle = query.trim().to_lowercase();

    let mut stops = Vec::new();
    feed.for_each_row("stops.txt", |row: StopLinkRow| {
        if let Some(stop) = FeedStop::from_row(row)
            && stop.name.to_lowercase().contains(&needle)
        {
            stops.push(stop);
        }
    })?;

    let matches = stops
        .into_iter()
        .map(|stop| StopLink {
            direct_id_in_cache: catalog.match_stop_id(&stop.id).is_some(),
            parent_id_in_cache: stop
                .parent
                .as_deref()
                .is_some_and(|parent| catalog.match_stop_id(parent).is_some()),
            nearest_mvg_within_radius: nearby(catalog, stop.lat, stop.lon, radius_m),
            gtfs_stop_id: stop.id,
            gtfs_stop_name: stop.name,
            gtfs_parent_station: stop.parent,
        })
        .collect();

    Ok(StopLinkReport {
        query: query.to_string(),
        radius_m,
        matches,
    })
}

fn nearby(catalog: &StationCatalog, lat: f64, lon: f64, radius_m: f64) -> Vec<NearbyStation> {
    let mut found: Vec<(f64, &StationId, &str)> = catalog
        .stations()
        .filter_map(|station| {
            let (slat, slon) = (station.latitude?, station.longitude?);
            let d = haversine_m(lat, lon, slat, slon);
            (d <= radius_m).then_some((d, &station.id, station.name.as_str()))
        })
        .collect();
    found.sort_by(|a, b| a.0.total_cmp(&b.0));

    found
        .into_iter()
        .take(MAX_NEARBY)
        .map(|(d, id, name)| NearbyStation {
            distance_m: (d * 10.0).round() / 10.0,
            station_id: id.clone(),
            station_name: name.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Station;
    use tempfile::tempdir;

    fn station(id: &str, name: &str, lat: f64, lon: f64) -> Station {
        let mut station = Station::new(StationId::parse(id).unwrap(), name, ["TRAM"]);
        station.latitude = Some(lat);
        station.longitude = Some(lon);
        station
    }

    fn catalog() -> StationCatalog {
        StationCatalog::new([
            station("de:09162:6", "Hauptbahnhof", 48.14010, 11.55860),
            station("de:09162:7", "Hauptbahnhof Nord", 48.14180, 11.55900),
            station("de:09162:70", "Sendlinger Tor", 48.13340, 11.56690),
            Station::new(StationId::parse("de:09162:99").unwrap(), "No Coordinates", ["BUS"]),
        ])
    }

    const STOPS: &str = "\u{feff}stop_id,stop_name,stop_lat,stop_lon,location_type,parent_station\n\
        de:09162:6:1:1,Hauptbahnhof Gleis 1,48.14020,11.55870,0,\n\
        x1,Hauptbahnhof Süd,48.13950,11.55850,0,de:09162:6\n\
        x2,Hauptbahnhof Bus,not-a-number,11.55850,0,\n\
        x3,Karlsplatz,48.13900,11.56600,0,\n";

    fn feed() -> (tempfile::TempDir, Feed) {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("stops.txt"), STOPS).unwrap();
        let feed = Feed::Dir(dir.path().to_path_buf());
        (dir, feed)
    }

    #[test]
    fn haversine_known_distances() {
        assert_eq!(haversine_m(48.1, 11.5, 48.1, 11.5), 0.0);
        // One degree of latitude is about 111.2 km.
        let d = haversine_m(48.0, 11.5, 49.0, 11.5);
        assert!((d - 111_195.0).abs() < 10.0, "{d}");
    }

    #[test]
    fn links_matching_stops_by_id_and_distance() {
        let (_dir, mut feed) = feed();
        let catalog = catalog();

        let report = link_stops(&mut feed, &catalog, " hauptBAHNHOF ", DEFAULT_LINK_RADIUS_M).unwrap();
        assert_eq!(report.query, " hauptBAHNHOF ");
        assert_eq!(report.radius_m, 300.0);

        // The stop with unparseable coordinates is dropped.
        let ids: Vec<&str> = report.matches.iter().map(|m| m.gtfs_stop_id.as_str()).collect();
        assert_eq!(ids, vec!["de:09162:6:1:1", "x1"]);

        let platform = &report.matches[0];
        assert!(platform.direct_id_in_cache);
        assert!(!platform.parent_id_in_cache);
        assert_eq!(platform.gtfs_parent_station, None);
        let near: Vec<&str> = platform
            .nearest_mvg_within_radius
            .iter()
            .map(|n| n.station_id.as_str())
            .collect();
        assert_eq!(near, vec!["de:09162:6", "de:09162:7"]);
        assert!(platform.nearest_mvg_within_radius[0].distance_m < 20.0);

        let child = &report.matches[1];
        assert!(!child.direct_id_in_cache);
        assert!(child.parent_id_in_cache);
        assert_eq!(child.gtfs_parent_station.as_deref(), Some("de:09162:6"));
    }

    #[test]
    fn distances_are_rounded_and_bounded_by_radius() {
        let (_dir, mut feed) = feed();
        let catalog = catalog();

        let report = link_stops(&mut feed, &catalog, "Karlsplatz", 580.0).unwrap();
        assert_eq!(report.matches.len(), 1);
        let near = &report.matches[0].nearest_mvg_within_radius;
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].station_id.as_str(), "de:09162:6");
        assert!(near[0].distance_m <= 580.0);
        let tenths = near[0].distance_m * 10.0;
        assert!((tenths - tenths.round()).abs() < 1e-6);

        let wide = link_stops(&mut feed, &catalog, "Karlsplatz", 2_000.0).unwrap();
        let near = &wide.matches[0].nearest_mvg_within_radius;
        assert_eq!(near.len(), 3);
        assert!(near.windows(2).all(|w| w[0].distance_m <= w[1].distance_m));
        assert_eq!(near[2].station_id.as_str(), "de:09162:70");
    }

    #[test]
    fn report_serializes_with_stable_field_names() {
        let (_dir, mut feed) = feed();
        let report = link_stops(&mut feed, &catalog(), "Süd", 300.0).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["query"], "Süd");
        assert_eq!(json["radius_m"], 300.0);
        let first = &json["matches"][0];
        assert_eq!(first["gtfs_stop_id"], "x1");
        assert_eq!(first["gtfs_parent_station"], "de:09162:6");
        assert_eq!(first["parent_id_in_cache"], true);
        assert_eq!(first["nearest_mvg_within_radius"][0]["station_id"], "de:09162:6");
    }

    #[test]
    fn no_matches_is_an_empty_report() {
        let (_dir, mut feed) = feed();
        let report = link_stops(&mut feed, &catalog(), "Nowhere", 300.0).unwrap();
        assert!(report.matches.is_empty());
    }

    #[test]
    fn missing_stops_table_is_an_error() {
        let dir = tempdir().unwrap();
        let mut feed = Feed::Dir(dir.path().to_path_buf());
        assert!(matches!(
            link_stops(&mut feed, &catalog(), "x", 300.0),
            Err(StationError::Feed { .. })
        ));
    }
}
