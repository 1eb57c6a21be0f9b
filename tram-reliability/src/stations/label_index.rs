//! (product, line label) → stations index.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{StationId, normalize_label, normalize_product};

use super::cache::ensure_parent_dir;
use super::error::StationError;

/// Precomputed mapping from product and line label to the stations the line
/// serves.
///
/// Advisory only: a stale index may over- or under-select, and nothing checks
/// it against live departures. Keys are stored normalized (upper-case) so
/// lookups are case-insensitive.
///
/// On disk this is `{"mapping": {"TRAM": {"27": ["de:09162:6", ...]}}, "source": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelIndex {
    #[serde(default)]
    mapping: BTreeMap<String, BTreeMap<String, BTreeSet<StationId>>>,
    /// Where the index was built from (feed path or URL).
    #[serde(default)]
    pub source: String,
}

impl LabelIndex {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            mapping: BTreeMap::new(),
            source: source.into(),
        }
    }

    /// Add stations under `(product, label)`.
    pub fn insert<I>(&mut self, product: &str, label: &str, stations: I)
    where
        I: IntoIterator<Item = StationId>,
    {
        self.mapping
            .entry(normalize_product(product))
            .or_default()
            .entry(normalize_label(label))
            .or_default()
            .extend(stations);
    }

    /// Stations for `(product, label)`, `None` if the pair is absent.
    pub fn lookup(&self, product: &str, label: &str) -> Option<&BTreeSet<StationId>> {
        self.mapping
            .get(&normalize_product(product))?
            .get(&normalize_label(label))
    }

    /// Labels known for a product.
    pub fn labels(&self, product: &str) -> impl Iterator<Item = &str> {
        self.mapping
            .get(&normalize_product(product))
            .into_iter()
            .flat_map(|labels| labels.keys().map(String::as_str))
    }

    pub fn products(&self) -> impl Iterator<Item = &str> {
        self.mapping.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.values().all(BTreeMap::is_empty)
    }

    /// Read an index file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StationError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| StationError::LabelIndex {
            message: format!("failed to read {}: {e}", path.display()),
        })?;

        serde_json::from_str(&contents).map_err(|e| StationError::LabelIndex {
            message: format!("failed to parse {}: {e}", path.display()),
        })
    }

    /// Write the index as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StationError> {
        let path = path.as_ref();
        ensure_parent_dir(path).map_err(|e| StationError::LabelIndex {
            message: format!("failed to create directory for {}: {e}", path.display()),
        })?;

        let json = serde_json::to_string_pretty(self).map_err(|e| StationError::LabelIndex {
            message: format!("failed to serialize index: {e}"),
        })?;

        std::fs::write(path, json).map_err(|e| StationError::LabelIndex {
            message: format!("failed to write {}: {e}", path.display()),
        })
    }
}
