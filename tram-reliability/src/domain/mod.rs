//! Domain types for departure ingestion.
//!
//! These types represent validated transit data. Identifiers enforce their
//! invariants at construction time, and products/labels are normalized, so
//! code receiving these types can compare them directly.

mod product;
mod record;
mod station;
mod station_id;

pub use product::{ALL_PRODUCTS, ProductFilter, normalize_label, normalize_product};
pub use record::{DepartureKey, DepartureRecord};
pub use station::{Station, normalize_name};
pub use station_id::{InvalidStationId, StationId};

pub(crate) use station_id::base_segments;
