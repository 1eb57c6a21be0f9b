//! Basic reliability aggregates over stored departures.
//!
//! Rows are grouped by the UTC date of the planned departure, which is stable
//! across updates of the same departure.

use serde::Serialize;

use super::error::StorageError;
use super::sqlite::SqliteStore;

/// Counts per (date, transport type, label, destination).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineMetrics {
    pub date: String,
    pub transport_type: String,
    pub label: String,
    pub destination: String,
    pub count_total: i64,
    pub count_cancelled: i64,
    pub cancellation_rate: f64,
    /// `None` when no departure in the group carried a delay.
    pub avg_delay: Option<f64>,
}

/// Counts per (date, station).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationMetrics {
    pub date: String,
    pub station_id: String,
    /// From the synced `stations` table, if present.
    pub station_name: Option<String>,
    pub count_total: i64,
    pub count_cancelled: i64,
    pub cancellation_rate: f64,
    pub avg_delay: Option<f64>,
}

const LINE_METRICS: &str = r#"
    SELECT date(planned_departure_time, 'unixepoch') AS day,
           transport_type,
           label,
           destination,
           COUNT(*) AS count_total,
           SUM(CASE WHEN cancelled THEN 1 ELSE 0 END) AS count_cancelled,
           AVG(delay_in_minutes) AS avg_delay
    FROM departures
    GROUP BY day, transport_type, label, destination
    ORDER BY day, transport_type, label, destination
"#;

const STATION_METRICS: &str = r#"
    SELECT date(d.planned_departure_time, 'unixepoch') AS day,
           d.station_id,
           s.name,
           COUNT(*) AS count_total,
           SUM(CASE WHEN d.cancelled THEN 1 ELSE 0 END) AS count_cancelled,
           AVG(d.delay_in_minutes) AS avg_delay
    FROM departures d
    LEFT JOIN stations s ON s.station_id = d.station_id
    GROUP BY day, d.station_id
    ORDER BY day, d.station_id
"#;

fn rate(cancelled: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        cancelled as f64 / total as f64
    }
}

impl SqliteStore {
    pub async fn line_metrics(&self) -> Result<Vec<LineMetrics>, StorageError> {
        let rows: Vec<(String, String, String, String, i64, i64, Option<f64>)> =
            sqlx::query_as(LINE_METRICS).fetch_all(self.pool()).await?;

        Ok(rows
            .into_iter()
            .map(
                |(date, transport_type, label, destination, total, cancelled, avg_delay)| {
                    LineMetrics {
                        date,
                        transport_type,
                        label,
                        destination,
                        count_total: total,
                        count_cancelled: cancelled,
                        cancellation_rate: rate(cancelled, total),
                        avg_delay,
                    }
                },
            )
            .collect())
    }

    pub async fn station_metrics(&self) -> Result<Vec<StationMetrics>, StorageError> {
        let rows: Vec<(String, String, Option<String>, i64, i64, Option<f64>)> =
            sqlx::query_as(STATION_METRICS).fetch_all(self.pool()).await?;

        Ok(rows
            .into_iter()
            .map(
                |(date, station_id, station_name, total, cancelled, avg_delay)| StationMetrics {
                    date,
                    station_id,
                    station_name,
                    count_total: total,
                    count_cancelled: cancelled,
                    cancellation_rate: rate(cancelled, total),
                    avg_delay,
                },
            )
            .collect())
    }
}
