//! Resolve a selection request into the set of stations to poll.
//!
//! Resolution order, first match wins:
//! 1. explicit station ids, taken as-is
//! 2. explicit station names, resolved through the catalog
//! 3. line labels through the label index (when asked to use it)
//! 4. the catalog filtered by product

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::domain::{ProductFilter, StationId, normalize_label};
use crate::stations::{LabelIndex, StationCatalog};

/// What to poll.
///
/// Empty collections mean "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionCriteria {
    pub products: ProductFilter,
    /// Normalized line labels.
    pub labels: BTreeSet<String>,
    pub explicit_names: Vec<String>,
    pub explicit_ids: BTreeSet<StationId>,
    pub use_label_index: bool,
}

impl SelectionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(mut self, products: ProductFilter) -> Self {
        self.products = products;
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.labels = labels
            .into_iter()
            .map(|l| normalize_label(l.as_ref()))
            .filter(|l| !l.is_empty())
            .collect();
        self
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.explicit_names = names
            .into_iter()
            .map(Into::into)
            .filter(|n| !n.trim().is_empty())
            .collect();
        self
    }

    pub fn with_ids(mut self, ids: impl IntoIterator<Item = StationId>) -> Self {
        self.explicit_ids = ids.into_iter().collect();
        self
    }

    pub fn with_label_index(mut self, use_index: bool) -> Self {
        self.use_label_index = use_index;
        self
    }

    /// Labels that departures must carry to be recorded, if restricted.
    pub fn label_filter(&self) -> Option<&BTreeSet<String>> {
        (!self.labels.is_empty()).then_some(&self.labels)
    }
}

/// Names that did not resolve to any catalog station.
///
/// Reported, never fatal: the rest of the selection still runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown station names: {}", .names.join(", "))]
pub struct UnknownStationError {
    pub names: Vec<String>,
}

/// Selection could not be made at all. Aborts the run before any fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("label index requested for labels {labels:?} but no index is loaded")]
    LabelIndexMissing { labels: Vec<String> },
}

/// Which resolution step produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    ExplicitIds,
    Names,
    LabelIndex,
    Products,
}

impl fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SelectionSource::ExplicitIds => "explicit_ids",
            SelectionSource::Names => "names",
            SelectionSource::LabelIndex => "label_index",
            SelectionSource::Products => "products",
        };
        f.write_str(s)
    }
}

/// The resolved set of stations plus what could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub station_ids: BTreeSet<StationId>,
    pub source: SelectionSource,
    pub unknown: Option<UnknownStationError>,
    /// `(product, label)` pairs absent from the label index.
    pub index_misses: Vec<(String, String)>,
}

impl Selection {
    fn new(source: SelectionSource, station_ids: BTreeSet<StationId>) -> Self {
        Self {
            station_ids,
            source,
            unknown: None,
            index_misses: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.station_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.station_ids.len()
    }
}

/// Resolves [`SelectionCriteria`] against a catalog snapshot.
#[derive(Debug, Clone, Copy)]
pub struct StationSelector<'a> {
    catalog: &'a StationCatalog,
    index: Option<&'a LabelIndex>,
}

impl<'a> StationSelector<'a> {
    pub fn new(catalog: &'a StationCatalog, index: Option<&'a LabelIndex>) -> Self {
        Self { catalog, index }
    }

    pub fn select(&self, criteria: &SelectionCriteria) -> Result<Selection, SelectionError> {
        if !criteria.explicit_ids.is_empty() {
            return Ok(Selection::new(
                SelectionSource::ExplicitIds,
                criteria.explicit_ids.clone(),
            ));
        }

        if !criteria.explicit_names.is_empty() {
            return Ok(self.select_by_names(&criteria.explicit_names));
        }

        if !criteria.labels.is_empty() && criteria.use_label_index {
            let index = self.index.ok_or_else(|| SelectionError::LabelIndexMissing {
                labels: criteria.labels.iter().cloned().collect(),
            })?;
            return Ok(select_by_index(index, &criteria.products, &criteria.labels));
        }

        let ids = self
            .catalog
            .filter_by_products(&criteria.products)
            .map(|s| s.id.clone())
            .collect();
        Ok(Selection::new(SelectionSource::Products, ids))
    }

    fn select_by_names(&self, names: &[String]) -> Selection {
        let mut ids = BTreeSet::new();
        let mut unknown = Vec::new();

        for name in names {
            match self.catalog.resolve_name(name) {
                Some(matches) => ids.extend(matches.iter().cloned()),
                None => unknown.push(name.trim().to_string()),
            }
        }

        let mut selection = Selection::new(SelectionSource::Names, ids);
        if !unknown.is_empty() {
            selection.unknown = Some(UnknownStationError { names: unknown });
        }
        selection
    }
}

fn select_by_index(
    index: &LabelIndex,
    products: &ProductFilter,
    labels: &BTreeSet<String>,
) -> Selection {
    let mut ids = BTreeSet::new();
    let mut misses = Vec::new();

    for product in products.index_keys() {
        for label in labels {
            match index.lookup(&product, label) {
                Some(stations) => ids.extend(stations.iter().cloned()),
                None => {
                    debug!(product = %product, label = %label, "label index has no entry");
                    misses.push((product.clone(), label.clone()));
                }
            }
        }
    }

    let mut selection = Selection::new(SelectionSource::LabelIndex, ids);
    selection.index_misses = misses;
    selection
}
