//! Canonical departure records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::station_id::StationId;

/// The natural key of a departure event.
///
/// Two observations with equal keys describe the same scheduled departure.
/// `destination` is the empty string when upstream omits it, so the key never
/// contains a null.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DepartureKey {
    pub station_id: StationId,
    pub transport_type: String,
    pub label: String,
    pub destination: String,
    pub planned_departure: DateTime<Utc>,
}

/// One observed departure, ready to be recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartureRecord {
    #[serde(flatten)]
    pub key: DepartureKey,
    pub realtime_departure: Option<DateTime<Utc>>,
    pub delay_minutes: Option<i64>,
    pub cancelled: bool,
    pub platform: Option<String>,
    pub is_realtime: bool,
    pub fetched_at: DateTime<Utc>,
}
