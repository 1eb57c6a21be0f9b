//! Station metadata kept on disk between runs.
//!
//! The file holds the full station list plus the time it was written:
//!
//! ```text
//! {"written_at": "2024-01-01T08:00:00Z", "stations": [...]}
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Station;

use super::error::StationError;

/// Metadata is refetched once a day.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    written_at: DateTime<Utc>,
    stations: Vec<Station>,
}

#[derive(Debug, Clone)]
pub struct StationCacheConfig {
    pub path: PathBuf,
    /// Age after which the file counts as stale.
    pub ttl: Duration,
}

impl StationCacheConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl Default for StationCacheConfig {
    fn default() -> Self {
        Self::new("data/stations.json")
    }
}

/// Reads and writes the station snapshot file.
///
/// An unreadable or corrupt file is treated like a missing one, so callers
/// fall through to a refresh.
#[derive(Debug, Clone)]
pub struct StationCache {
    config: StationCacheConfig,
}

impl StationCache {
    pub fn new(config: StationCacheConfig) -> Self {
        Self { config }
    }

    /// Stations from a snapshot younger than the TTL.
    pub fn load(&self) -> Option<Vec<Station>> {
        let snapshot = self.read()?;
        let age = Utc::now().signed_duration_since(snapshot.written_at);
        let fresh = age
            .to_std()
            .map_or(true, |age| age < self.config.ttl);

        if !fresh {
            debug!(path = %self.path().display(), age_secs = age.num_seconds(), "station cache expired");
            return None;
        }
        Some(snapshot.stations)
    }

    /// Stations from any snapshot, however old. Fallback for failed refreshes.
    pub fn load_stale(&self) -> Option<Vec<Station>> {
        self.read().map(|snapshot| snapshot.stations)
    }

    /// When the snapshot on disk was written, if there is a readable one.
    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        self.read().map(|snapshot| snapshot.written_at)
    }

    /// Replace the snapshot.
    pub fn save(&self, stations: &[Station]) -> Result<(), StationError> {
        let snapshot = Snapshot {
            written_at: Utc::now(),
            stations: stations.to_vec(),
        };
        let path = self.path();

        ensure_parent_dir(path).map_err(|e| StationError::Cache {
            message: format!("cannot create directory for {}: {e}", path.display()),
        })?;
        let json = serde_json::to_vec_pretty(&snapshot).map_err(|e| StationError::Cache {
            message: format!("cannot encode station snapshot: {e}"),
        })?;
        std::fs::write(path, json).map_err(|e| StationError::Cache {
            message: format!("cannot write {}: {e}", path.display()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    fn read(&self) -> Option<Snapshot> {
        let bytes = std::fs::read(self.path()).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!(path = %self.path().display(), error = %e, "ignoring unreadable station cache");
                None
            }
        }
    }
}

/// Create the parent directory of `path` if it has one and it is missing.
pub(crate) fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StationId;
    use tempfile::tempdir;

    fn sample() -> Vec<Station> {
        vec![
            Station::new(StationId::parse("de:09162:6").unwrap(), "Hauptbahnhof", ["TRAM", "UBAHN"]),
            Station::new(StationId::parse("de:09162:70").unwrap(), "Sendlinger Tor", ["TRAM"]),
        ]
    }

    fn cache_in(dir: &Path, ttl: Duration) -> StationCache {
        StationCache::new(StationCacheConfig::new(dir.join("stations.json")).with_ttl(ttl))
    }

    #[test]
    fn fresh_snapshot_round_trips() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), DEFAULT_TTL);

        cache.save(&sample()).unwrap();
        assert_eq!(cache.load().unwrap(), sample());
        assert!(cache.written_at().unwrap() <= Utc::now());
    }

    #[test]
    fn zero_ttl_is_always_stale() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), Duration::ZERO);

        cache.save(&sample()).unwrap();
        assert!(cache.load().is_none());
        assert_eq!(cache.load_stale().unwrap().len(), 2);
    }

    #[test]
    fn old_snapshot_on_disk_is_stale() {
        let dir = tempdir().unwrap();
        let written_at = Utc::now() - chrono::Duration::hours(30);
        let snapshot = Snapshot {
            written_at,
            stations: sample(),
        };
        std::fs::write(
            dir.path().join("stations.json"),
            serde_json::to_string(&snapshot).unwrap(),
        )
        .unwrap();

        let cache = cache_in(dir.path(), DEFAULT_TTL);
        assert!(cache.load().is_none());
        assert_eq!(cache.load_stale().unwrap(), sample());
    }

    #[test]
    fn missing_or_corrupt_file_reads_as_absent() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), DEFAULT_TTL);
        assert!(cache.load_stale().is_none());

        std::fs::write(cache.path(), "{\"written_at\": 3").unwrap();
        assert!(cache.load().is_none());
        assert!(cache.written_at().is_none());
    }

    #[test]
    fn save_creates_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("stations.json");
        let cache = StationCache::new(StationCacheConfig::new(&path));

        cache.save(&sample()).unwrap();
        assert!(path.exists());
    }
}
