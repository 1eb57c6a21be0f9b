//! Turn raw board entries into canonical departure records.
//!
//! Everything here is pure: the fetch time is captured once per board by the
//! caller and passed in.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{DepartureKey, DepartureRecord, StationId, normalize_label, normalize_product};
use crate::mvg::{RawDeparture, Scalar};

/// Epoch values above this are taken to be milliseconds.
const MILLIS_THRESHOLD: i64 = 10_000_000_000;

/// Why an entry was not turned into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
pub enum Skipped {
    #[error("missing transport type")]
    MissingTransportType,
    #[error("missing line label")]
    MissingLabel,
    #[error("missing planned departure time")]
    MissingPlannedTime,
    #[error("planned departure time out of range")]
    InvalidPlannedTime,
}

/// Convert an epoch scalar (seconds or milliseconds, number or numeric
/// string) to whole seconds. Fractions are truncated.
pub fn epoch_seconds(value: &Scalar) -> Option<i64> {
    let secs = match value {
        Scalar::Int(n) => *n,
        Scalar::Float(f) if f.is_finite() => f.trunc() as i64,
        Scalar::Float(_) => return None,
        Scalar::Text(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(n) => n,
                Err(_) => {
                    let f = s.parse::<f64>().ok().filter(|f| f.is_finite())?;
                    f.trunc() as i64
                }
            }
        }
    };

    Some(if secs > MILLIS_THRESHOLD {
        secs / 1000
    } else {
        secs
    })
}

fn timestamp(value: Option<&Scalar>) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(epoch_seconds(value?)?, 0)
}

/// Minutes between planned and realtime departure, rounded half away from zero.
pub fn delay_between(planned: DateTime<Utc>, realtime: DateTime<Utc>) -> i64 {
    let secs = (realtime - planned).num_seconds();
    (secs as f64 / 60.0).round() as i64
}

/// Normalize one raw entry observed at `station` at `fetched_at`.
///
/// Entries without a transport type, label or planned time cannot be keyed
/// and are skipped. Every other field has a default.
pub fn normalize(
    station: &StationId,
    raw: &RawDeparture,
    fetched_at: DateTime<Utc>,
) -> Result<DepartureRecord, Skipped> {
    let transport_type = raw
        .transport_type
        .as_deref()
        .map(normalize_product)
        .filter(|t| !t.is_empty())
        .ok_or(Skipped::MissingTransportType)?;

    let label = raw
        .label
        .as_ref()
        .and_then(Scalar::as_text)
        .map(|l| normalize_label(&l))
        .ok_or(Skipped::MissingLabel)?;

    let planned_raw = raw
        .planned_departure_time
        .as_ref()
        .ok_or(Skipped::MissingPlannedTime)?;
    let planned_departure = timestamp(Some(planned_raw)).ok_or(Skipped::InvalidPlannedTime)?;

    let realtime_departure = timestamp(raw.realtime_departure_time.as_ref());

    let delay_minutes = raw
        .delay_in_minutes
        .as_ref()
        .and_then(Scalar::as_i64)
        .or_else(|| realtime_departure.map(|rt| delay_between(planned_departure, rt)));

    let destination = raw
        .destination
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    Ok(DepartureRecord {
        key: DepartureKey {
            station_id: station.clone(),
            transport_type,
            label,
            destination,
            planned_departure,
        },
        realtime_departure,
        delay_minutes,
        cancelled: raw.cancelled.unwrap_or(false),
        platform: raw.platform.as_ref().and_then(Scalar::as_text),
        is_realtime: raw.realtime.unwrap_or(false),
        fetched_at,
    })
}

/// A station's board after normalization, filtering and de-duplication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBoard {
    pub records: Vec<DepartureRecord>,
    /// Entries missing identity fields.
    pub skipped: usize,
    /// `skipped`, broken down by reason.
    pub skipped_by_reason: BTreeMap<Skipped, usize>,
    /// Entries whose label is outside the requested label set.
    pub filtered: usize,
    /// Entries repeating a key already seen on this board.
    pub duplicates: usize,
}

/// Normalize a whole board.
///
/// With a label filter, only records whose (normalized) label is in the set
/// are kept. Within the board the first entry for a key wins.
pub fn normalize_board(
    station: &StationId,
    board: &[RawDeparture],
    fetched_at: DateTime<Utc>,
    labels: Option<&BTreeSet<String>>,
) -> NormalizedBoard {
    let mut out = NormalizedBoard::default();
    let mut seen: HashSet<DepartureKey> = HashSet::new();

    for raw in board {
        let record = match normalize(station, raw, fetched_at) {
            Ok(record) => record,
            Err(reason) => {
                debug!(station = %station, reason = %reason, "skipping board entry");
                out.skipped += 1;
                *out.skipped_by_reason.entry(reason).or_default() += 1;
                continue;
            }
        };

        if let Some(labels) = labels
            && !labels.contains(&record.key.label)
        {
            out.filtered += 1;
            continue;
        }

        if !seen.insert(record.key.clone()) {
            out.duplicates += 1;
            continue;
        }

        out.records.push(record);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn station() -> StationId {
        StationId::parse("X").unwrap()
    }

    fn fetched() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 7, 59, 0).unwrap()
    }

    fn planned() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
    }

    fn raw(label: &str) -> RawDeparture {
        RawDeparture {
            planned_departure_time: Some(Scalar::Int(planned().timestamp())),
            transport_type: Some("TRAM".into()),
            label: Some(Scalar::Text(label.into())),
            destination: Some("Petuelring".into()),
            ..RawDeparture::default()
        }
    }

    #[test]
    fn epoch_seconds_accepts_all_shapes() {
        assert_eq!(epoch_seconds(&Scalar::Int(1_700_000_000)), Some(1_700_000_000));
        assert_eq!(epoch_seconds(&Scalar::Int(1_700_000_000_123)), Some(1_700_000_000));
        assert_eq!(epoch_seconds(&Scalar::Float(1_700_000_000.9)), Some(1_700_000_000));
        assert_eq!(epoch_seconds(&Scalar::Text("1700000000000".into())), Some(1_700_000_000));
        assert_eq!(epoch_seconds(&Scalar::Text(" 1700000000.5 ".into())), Some(1_700_000_000));
        assert_eq!(epoch_seconds(&Scalar::Text("tomorrow".into())), None);
        assert_eq!(epoch_seconds(&Scalar::Float(f64::INFINITY)), None);
    }

    #[test]
    fn delay_computed_from_timestamps() {
        let mut entry = raw("27");
        entry.realtime_departure_time = Some(Scalar::Int(planned().timestamp() + 180));

        let record = normalize(&station(), &entry, fetched()).unwrap();
        assert_eq!(record.delay_minutes, Some(3));
        assert_eq!(record.realtime_departure, Some(planned() + chrono::Duration::minutes(3)));
    }

    #[test]
    fn delay_rounds_half_away_from_zero() {
        assert_eq!(delay_between(planned(), planned() + chrono::Duration::seconds(90)), 2);
        assert_eq!(delay_between(planned(), planned() + chrono::Duration::seconds(89)), 1);
        assert_eq!(delay_between(planned(), planned() - chrono::Duration::seconds(90)), -2);
        assert_eq!(delay_between(planned(), planned() + chrono::Duration::seconds(29)), 0);
    }

    #[test]
    fn payload_delay_wins() {
        let mut entry = raw("27");
        entry.realtime_departure_time = Some(Scalar::Int(planned().timestamp() + 600));
        entry.delay_in_minutes = Some(Scalar::Int(4));

        let record = normalize(&station(), &entry, fetched()).unwrap();
        assert_eq!(record.delay_minutes, Some(4));
    }

    #[test]
    fn no_realtime_means_no_delay() {
        let record = normalize(&station(), &raw("27"), fetched()).unwrap();
        assert_eq!(record.delay_minutes, None);
        assert_eq!(record.realtime_departure, None);
    }

    #[test]
    fn defaults_for_optional_fields() {
        let mut entry = raw("27");
        entry.destination = None;

        let record = normalize(&station(), &entry, fetched()).unwrap();
        assert_eq!(record.key.destination, "");
        assert_eq!(record.platform, None);
        assert!(!record.cancelled);
        assert!(!record.is_realtime);
        assert_eq!(record.fetched_at, fetched());
    }

    #[test]
    fn numeric_platform_and_label_become_text() {
        let mut entry = raw("27");
        entry.label = Some(Scalar::Int(27));
        entry.platform = Some(Scalar::Int(2));
        entry.transport_type = Some(" tram ".into());

        let record = normalize(&station(), &entry, fetched()).unwrap();
        assert_eq!(record.key.label, "27");
        assert_eq!(record.key.transport_type, "TRAM");
        assert_eq!(record.platform.as_deref(), Some("2"));
    }

    #[test]
    fn missing_identity_fields_are_skipped() {
        let mut entry = raw("27");
        entry.transport_type = None;
        assert_eq!(
            normalize(&station(), &entry, fetched()),
            Err(Skipped::MissingTransportType)
        );

        let mut entry = raw("27");
        entry.transport_type = Some("  ".into());
        assert_eq!(
            normalize(&station(), &entry, fetched()),
            Err(Skipped::MissingTransportType)
        );

        let mut entry = raw("27");
        entry.label = None;
        assert_eq!(normalize(&station(), &entry, fetched()), Err(Skipped::MissingLabel));

        let mut entry = raw("27");
        entry.planned_departure_time = None;
        assert_eq!(
            normalize(&station(), &entry, fetched()),
            Err(Skipped::MissingPlannedTime)
        );

        let mut entry = raw("27");
        entry.planned_departure_time = Some(Scalar::Text("later".into()));
        assert_eq!(
            normalize(&station(), &entry, fetched()),
            Err(Skipped::InvalidPlannedTime)
        );
    }

    #[test]
    fn board_counts_skipped_filtered_and_duplicates() {
        let board = vec![
            raw("27"),
            raw("27"),
            raw("19"),
            RawDeparture::default(),
            raw(" 27 "),
        ];
        let labels = BTreeSet::from(["27".to_string()]);

        let out = normalize_board(&station(), &board, fetched(), Some(&labels));
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.duplicates, 2);
        assert_eq!(out.filtered, 1);
        assert_eq!(out.skipped, 1);
        assert_eq!(
            out.skipped_by_reason,
            BTreeMap::from([(Skipped::MissingTransportType, 1)])
        );
    }

    #[test]
    fn skip_reasons_are_counted_separately() {
        let mut no_label = raw("27");
        no_label.label = None;
        let mut bad_time = raw("19");
        bad_time.planned_departure_time = Some(Scalar::Text("soon".into()));
        let board = vec![raw("27"), no_label.clone(), bad_time, no_label];

        let out = normalize_board(&station(), &board, fetched(), None);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.skipped, 3);
        assert_eq!(
            out.skipped_by_reason,
            BTreeMap::from([(Skipped::MissingLabel, 2), (Skipped::InvalidPlannedTime, 1)])
        );
    }

    #[test]
    fn board_without_filter_keeps_all_labels() {
        let board = vec![raw("27"), raw("19")];
        let out = normalize_board(&station(), &board, fetched(), None);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.filtered, 0);
    }
}
