//! Transit products and line labels.
//!
//! Upstream data spells products and labels inconsistently (`tram`, `TRAM `,
//! `t17`). Everything that compares them goes through the normalizers here.

use std::collections::BTreeSet;
use std::fmt;

/// Product tag meaning "every product".
pub const ALL_PRODUCTS: &str = "ALL";

/// Normalize a product tag: trimmed, upper-case.
pub fn normalize_product(tag: &str) -> String {
    tag.trim().to_uppercase()
}

/// Normalize a line label: trimmed, upper-case.
///
/// Numeric labels are compared as strings, so `"27"` only matches `"27"`.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_uppercase()
}

/// Which products a selection is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProductFilter {
    /// Every station, regardless of the products it serves.
    #[default]
    All,
    /// Stations serving at least one of these (normalized) products.
    Only(BTreeSet<String>),
}

impl ProductFilter {
    /// Build a filter from raw product tags.
    ///
    /// An empty list, or any tag equal to `ALL`, yields [`ProductFilter::All`].
    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: BTreeSet<String> = tags
            .into_iter()
            .map(|t| normalize_product(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();

        if tags.is_empty() || tags.contains(ALL_PRODUCTS) {
            ProductFilter::All
        } else {
            ProductFilter::Only(tags)
        }
    }

    /// Whether a station serving `products` qualifies.
    ///
    /// `products` must already be normalized.
    pub fn matches(&self, products: &BTreeSet<String>) -> bool {
        match self {
            ProductFilter::All => true,
            ProductFilter::Only(wanted) => !wanted.is_disjoint(products),
        }
    }

    /// The product keys to consult in a label index.
    pub fn index_keys(&self) -> Vec<String> {
        match self {
            ProductFilter::All => vec![ALL_PRODUCTS.to_string()],
            ProductFilter::Only(wanted) => wanted.iter().cloned().collect(),
        }
    }
}

impl fmt::Display for ProductFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductFilter::All => f.write_str(ALL_PRODUCTS),
            ProductFilter::Only(wanted) => {
                let joined = wanted.iter().map(String::as_str).collect::<Vec<_>>();
                f.write_str(&joined.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalizers_trim_and_uppercase() {
        assert_eq!(normalize_product(" tram "), "TRAM");
        assert_eq!(normalize_label("x30"), "X30");
        assert_eq!(normalize_label(" 27\t"), "27");
    }

    #[test]
    fn empty_tags_mean_all() {
        assert_eq!(ProductFilter::from_tags(Vec::<String>::new()), ProductFilter::All);
        assert_eq!(ProductFilter::from_tags(["", "  "]), ProductFilter::All);
    }

    #[test]
    fn all_tag_wins() {
        assert_eq!(ProductFilter::from_tags(["TRAM", "all"]), ProductFilter::All);
    }

    #[test]
    fn only_filter_normalizes() {
        let filter = ProductFilter::from_tags(["tram", " Bus"]);
        assert_eq!(filter, ProductFilter::Only(set(&["BUS", "TRAM"])));
        assert_eq!(filter.to_string(), "BUS,TRAM");
    }

    #[test]
    fn matches_on_intersection() {
        let filter = ProductFilter::from_tags(["TRAM"]);
        assert!(filter.matches(&set(&["TRAM"])));
        assert!(filter.matches(&set(&["BUS", "TRAM"])));
        assert!(!filter.matches(&set(&["UBAHN"])));
        assert!(!filter.matches(&set(&[])));
    }

    #[test]
    fn all_matches_stations_without_products() {
        assert!(ProductFilter::All.matches(&set(&[])));
    }

    #[test]
    fn index_keys() {
        assert_eq!(ProductFilter::All.index_keys(), vec!["ALL".to_string()]);
        assert_eq!(
            ProductFilter::from_tags(["TRAM", "BUS"]).index_keys(),
            vec!["BUS".to_string(), "TRAM".to_string()]
        );
    }
}
