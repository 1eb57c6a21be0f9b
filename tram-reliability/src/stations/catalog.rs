//! In-memory station catalog.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{info, warn};

use crate::domain::{ProductFilter, Station, StationId, normalize_name};
use crate::mvg::MvgClient;

use super::cache::StationCache;
use super::error::StationError;

/// An immutable snapshot of station metadata.
///
/// Built once (from the cache or a fresh fetch) and shared read-only with
/// every run; refreshing means building a new catalog.
#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    stations: BTreeMap<StationId, Station>,
    /// Normalized name to every station carrying it. Names repeat across
    /// places ("Bahnhof").
    by_name: HashMap<String, BTreeSet<StationId>>,
}

impl StationCatalog {
    /// Build a catalog from a list of stations.
    ///
    /// Later duplicates of an id replace earlier ones.
    pub fn new(stations: impl IntoIterator<Item = Station>) -> Self {
        let mut map = BTreeMap::new();
        for station in stations {
            map.insert(station.id.clone(), station);
        }

        let mut by_name: HashMap<String, BTreeSet<StationId>> = HashMap::new();
        for station in map.values() {
            by_name
                .entry(station.lookup_name())
                .or_default()
                .insert(station.id.clone());
        }

        Self {
            stations: map,
            by_name,
        }
    }

    /// Load the catalog from the cache, refreshing it through `client` when
    /// the cache is missing or expired.
    ///
    /// A failed refresh falls back to the stale cache if there is one.
    pub async fn load(
        cache: &StationCache,
        client: Option<&MvgClient>,
    ) -> Result<Self, StationError> {
        if let Some(stations) = cache.load() {
            return Ok(Self::new(stations));
        }

        let Some(client) = client else {
            return cache
                .load_stale()
                .map(Self::new)
                .ok_or_else(|| StationError::Unavailable {
                    message: format!("no station cache at {}", cache.path().display()),
                });
        };

        match Self::refresh(cache, client).await {
            Ok(catalog) => Ok(catalog),
            Err(err) => match cache.load_stale() {
                Some(stations) => {
                    warn!(error = %err, "station refresh failed, using stale cache");
                    Ok(Self::new(stations))
                }
                None => Err(err),
            },
        }
    }

    /// Fetch fresh metadata and write it to the cache.
    pub async fn refresh(cache: &StationCache, client: &MvgClient) -> Result<Self, StationError> {
        let stations = client.fetch_stations().await?;
        cache.save(&stations)?;
        info!(
            stations = stations.len(),
            path = %cache.path().display(),
            "station cache refreshed"
        );
        Ok(Self::new(stations))
    }

    pub fn get(&self, id: &StationId) -> Option<&Station> {
        self.stations.get(id)
    }

    pub fn contains(&self, id: &StationId) -> bool {
        self.stations.contains_key(id)
    }

    /// Every station whose display name matches (case-insensitive, trimmed).
    pub fn resolve_name(&self, name: &str) -> Option<&BTreeSet<StationId>> {
        self.by_name.get(&normalize_name(name))
    }

    /// Stations serving at least one product in `filter`, in id order.
    pub fn filter_by_products<'a>(
        &'a self,
        filter: &'a ProductFilter,
    ) -> impl Iterator<Item = &'a Station> + 'a {
        self.stations.values().filter(move |s| s.serves(filter))
    }

    /// Map a feed stop id (e.g. `de:09162:6:2:3`) to a catalog station.
    ///
    /// Matches on the first three colon-separated segments.
    pub fn match_stop_id(&self, stop_id: &str) -> Option<&StationId> {
        let base = crate::domain::base_segments(stop_id.trim());
        let id = StationId::parse(base).ok()?;
        self.stations.get_key_value(&id).map(|(k, _)| k)
    }

    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stations::StationCacheConfig;
    use std::time::Duration;
    use tempfile::tempdir;

    fn id(s: &str) -> StationId {
        StationId::parse(s).unwrap()
    }

    fn catalog() -> StationCatalog {
        StationCatalog::new([
            Station::new(id("de:09162:6"), "Hauptbahnhof", ["TRAM", "UBAHN", "SBAHN"]),
            Station::new(id("de:09162:70"), "Sendlinger Tor", ["TRAM", "UBAHN"]),
            Station::new(id("de:09162:1"), "Marienplatz", ["UBAHN", "SBAHN"]),
            Station::new(id("de:09162:500"), "Ostfriedhof", ["BUS"]),
        ])
    }

    #[test]
    fn resolve_name_is_case_insensitive() {
        let catalog = catalog();
        assert_eq!(
            catalog.resolve_name("  sendlinger TOR "),
            Some(&BTreeSet::from([id("de:09162:70")]))
        );
        assert_eq!(catalog.resolve_name("Nowhere"), None);
    }

    #[test]
    fn shared_names_resolve_to_every_station() {
        let catalog = StationCatalog::new([
            Station::new(id("de:09178:1"), "Bahnhof", ["BUS"]),
            Station::new(id("de:09188:2"), "Bahnhof", ["TRAM"]),
            Station::new(id("de:09162:6"), "Hauptbahnhof", ["TRAM"]),
        ]);

        let ids = catalog.resolve_name("bahnhof").unwrap();
        assert_eq!(ids, &BTreeSet::from([id("de:09178:1"), id("de:09188:2")]));
    }

    #[test]
    fn filter_by_products() {
        let catalog = catalog();

        let tram = ProductFilter::from_tags(["TRAM"]);
        let ids: Vec<&str> = catalog
            .filter_by_products(&tram)
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["de:09162:6", "de:09162:70"]);

        assert_eq!(catalog.filter_by_products(&ProductFilter::All).count(), 4);
    }

    #[test]
    fn match_stop_id_uses_base_segments() {
        let catalog = catalog();
        assert_eq!(catalog.match_stop_id("de:09162:6:2:3"), Some(&id("de:09162:6")));
        assert_eq!(catalog.match_stop_id("de:09162:6"), Some(&id("de:09162:6")));
        assert_eq!(catalog.match_stop_id("de:09162:999:1"), None);
        assert_eq!(catalog.match_stop_id(""), None);
    }

    #[test]
    fn duplicate_ids_keep_last() {
        let catalog = StationCatalog::new([
            Station::new(id("s1"), "Old", ["BUS"]),
            Station::new(id("s1"), "New", ["TRAM"]),
        ]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(&id("s1")).unwrap().name, "New");
    }

    #[tokio::test]
    async fn load_without_client_uses_stale_cache() {
        let dir = tempdir().unwrap();
        let config = StationCacheConfig::new(dir.path().join("stations.json"))
            .with_ttl(Duration::from_secs(0));
        let cache = StationCache::new(config);
        cache
            .save(&[Station::new(id("s1"), "Alpha", ["TRAM"])])
            .unwrap();

        let catalog = StationCatalog::load(&cache, None).await.unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn load_without_cache_or_client_fails() {
        let dir = tempdir().unwrap();
        let cache = StationCache::new(StationCacheConfig::new(dir.path().join("missing.json")));

        let err = StationCatalog::load(&cache, None).await.unwrap_err();
        assert!(matches!(err, StationError::Unavailable { .. }));
    }
}
