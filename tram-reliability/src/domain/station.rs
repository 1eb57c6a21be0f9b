//! Station metadata.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::product::{ProductFilter, normalize_product};
use super::station_id::StationId;

/// A station as known from the metadata API.
///
/// Products are normalized (upper-case) at construction so that filters can
/// compare them directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub diva_id: Option<i64>,
    #[serde(default)]
    pub tariff_zones: Option<String>,
    #[serde(default)]
    pub products: BTreeSet<String>,
}

impl Station {
    /// Create a station with the given id, name and products.
    pub fn new<I, S>(id: StationId, name: impl Into<String>, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            id,
            name: name.into(),
            place: None,
            latitude: None,
            longitude: None,
            diva_id: None,
            tariff_zones: None,
            products: products
                .into_iter()
                .map(|p| normalize_product(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether this station qualifies under `filter`.
    pub fn serves(&self, filter: &ProductFilter) -> bool {
        filter.matches(&self.products)
    }

    /// Name used for case-insensitive lookups.
    pub fn lookup_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Normalize a station name for matching: trimmed, lower-case.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> StationId {
        StationId::parse(s).unwrap()
    }

    #[test]
    fn new_normalizes_products() {
        let station = Station::new(id("de:09162:1"), "Marienplatz", ["ubahn", " SBAHN", ""]);
        let expected: BTreeSet<String> = ["SBAHN", "UBAHN"].iter().map(|s| s.to_string()).collect();
        assert_eq!(station.products, expected);
    }

    #[test]
    fn serves_by_product() {
        let station = Station::new(id("s1"), "Alpha", ["TRAM"]);
        assert!(station.serves(&ProductFilter::from_tags(["tram"])));
        assert!(station.serves(&ProductFilter::All));
        assert!(!station.serves(&ProductFilter::from_tags(["BUS"])));
    }

    #[test]
    fn lookup_name_is_case_insensitive() {
        let station = Station::new(id("s1"), "  Karlsplatz (Stachus) ", ["TRAM"]);
        assert_eq!(station.lookup_name(), "karlsplatz (stachus)");
        assert_eq!(normalize_name("KARLSPLATZ (STACHUS)"), station.lookup_name());
    }

    #[test]
    fn deserialize_with_missing_optionals() {
        let json = r#"{"id": "de:09162:1", "name": "Marienplatz"}"#;
        let station: Station = serde_json::from_str(json).unwrap();
        assert_eq!(station.id, id("de:09162:1"));
        assert!(station.products.is_empty());
        assert!(station.place.is_none());
    }
}
