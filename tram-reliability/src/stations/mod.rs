//! Station metadata: catalog, disk cache and the line label index.
//!
//! Metadata is fetched from the MVG stations endpoint at most once per cache
//! TTL. The label index is built offline from the GTFS feed and only consulted
//! when a selection asks for it. Stop link reports explain how feed stops
//! map onto catalog stations.

mod cache;
mod catalog;
mod error;
mod gtfs;
mod label_index;
mod stop_link;

pub use cache::{DEFAULT_TTL, StationCache, StationCacheConfig};
pub use catalog::StationCatalog;
pub use error::StationError;
pub use gtfs::{DEFAULT_GTFS_URL, Feed, GtfsIndexBuilder, GtfsSource, product_for_route_type};
pub use label_index::LabelIndex;
pub use stop_link::{
    DEFAULT_LINK_RADIUS_M, NearbyStation, StopLink, StopLinkReport, haversine_m, link_stops,
    link_stops_from_source,
};
