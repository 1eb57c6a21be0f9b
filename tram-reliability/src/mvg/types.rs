//! MVG API response DTOs.
//!
//! The departure payload is loosely typed in practice: timestamps arrive as
//! integers, floats or numeric strings, and platforms as numbers or text.
//! Everything is `Option` and scalar fields go through [`Scalar`] so that one
//! odd entry never fails the whole board.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::{Station, StationId};

/// A JSON scalar that may be a number or a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Integer value, rounding floats and parsing numeric strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(n) => Some(*n),
            Scalar::Float(f) if f.is_finite() => Some(f.round() as i64),
            Scalar::Float(_) => None,
            Scalar::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.round() as i64)
                })
            }
        }
    }

    /// Textual form, `None` when empty after trimming.
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{}", *f as i64),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s.trim().to_string(),
        };
        (!text.is_empty()).then_some(text)
    }
}

/// One entry of a departures board as returned by
/// `/api/bgw-pt/v3/departures`.
///
/// Snake-case aliases accept the older payload shape.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeparture {
    /// Scheduled departure, epoch seconds or milliseconds.
    #[serde(alias = "planned_departure_time")]
    pub planned_departure_time: Option<Scalar>,

    /// Predicted departure, epoch seconds or milliseconds.
    #[serde(alias = "realtime_departure_time")]
    pub realtime_departure_time: Option<Scalar>,

    /// Delay as reported by the API. Takes precedence over the computed one.
    #[serde(alias = "delay_in_minutes")]
    pub delay_in_minutes: Option<Scalar>,

    /// Product tag such as `TRAM`.
    #[serde(alias = "transport_type")]
    pub transport_type: Option<String>,

    /// Line label such as `19`.
    pub label: Option<Scalar>,

    pub destination: Option<String>,

    pub cancelled: Option<bool>,

    pub platform: Option<Scalar>,

    /// Whether the realtime time comes from live vehicle data.
    pub realtime: Option<bool>,
}

/// Decode a board, tolerating individual entries of the wrong shape.
///
/// Entries that are not objects of the expected shape become empty
/// [`RawDeparture`]s, which normalization later skips as malformed.
pub fn decode_entries(entries: Vec<Value>) -> Vec<RawDeparture> {
    entries
        .into_iter()
        .map(|entry| {
            serde_json::from_value(entry).unwrap_or_else(|e| {
                debug!(error = %e, "undecodable departure entry");
                RawDeparture::default()
            })
        })
        .collect()
}

/// Station entry from `/.rest/zdm/stations`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationDto {
    pub id: Option<String>,
    pub global_id: Option<String>,
    pub name: Option<String>,
    pub place: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub diva_id: Option<i64>,
    pub tariff_zones: Option<String>,
    #[serde(default)]
    pub products: Vec<String>,
}

impl StationDto {
    /// Convert to a domain station. `None` when the id or name is unusable.
    pub fn into_station(self) -> Option<Station> {
        let raw_id = self.id.or(self.global_id)?;
        let id = StationId::parse(&raw_id).ok()?;
        let name = self.name.filter(|n| !n.trim().is_empty())?;

        let mut station = Station::new(id, name.trim(), self.products);
        station.place = self.place;
        station.latitude = self.latitude;
        station.longitude = self.longitude;
        station.diva_id = self.diva_id;
        station.tariff_zones = self.tariff_zones;
        Some(station)
    }
}
