//! SQLite-backed departure store.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::domain::{DepartureKey, DepartureRecord, Station, StationId};

use super::error::StorageError;
use super::{DepartureStore, UpsertOutcome};

/// How long a writer waits for the database lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stations (
        station_id   TEXT PRIMARY KEY,
        name         TEXT NOT NULL,
        place        TEXT,
        latitude     REAL,
        longitude    REAL,
        diva_id      INTEGER,
        tariff_zones TEXT,
        products     TEXT NOT NULL DEFAULT '[]',
        last_seen_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS departures (
        id                      INTEGER PRIMARY KEY AUTOINCREMENT,
        station_id              TEXT NOT NULL,
        transport_type          TEXT NOT NULL,
        label                   TEXT NOT NULL,
        destination             TEXT NOT NULL DEFAULT '',
        planned_departure_time  INTEGER NOT NULL,
        realtime_departure_time INTEGER,
        delay_in_minutes        INTEGER,
        cancelled               INTEGER NOT NULL DEFAULT 0,
        platform                TEXT,
        realtime                INTEGER NOT NULL DEFAULT 0,
        first_seen_at           INTEGER NOT NULL,
        fetched_at              INTEGER NOT NULL,
        UNIQUE (station_id, transport_type, label, destination, planned_departure_time)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_departures_planned ON departures (planned_departure_time)",
    "CREATE INDEX IF NOT EXISTS idx_departures_station ON departures (station_id)",
];

// The departure statements all bind the same eleven parameters, see
// `bind_record`. SQLite allows unused numbered parameters.
const INSERT_DEPARTURE: &str = r#"
    INSERT INTO departures (
        station_id, transport_type, label, destination, planned_departure_time,
        realtime_departure_time, delay_in_minutes, cancelled, platform, realtime,
        first_seen_at, fetched_at
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
    ON CONFLICT (station_id, transport_type, label, destination, planned_departure_time)
    DO NOTHING
"#;

const UPDATE_DEPARTURE: &str = r#"
    UPDATE departures SET
        realtime_departure_time = ?6,
        delay_in_minutes = ?7,
        cancelled = ?8,
        platform = ?9,
        realtime = ?10,
        fetched_at = ?11
    WHERE station_id = ?1
      AND transport_type = ?2
      AND label = ?3
      AND destination = ?4
      AND planned_departure_time = ?5
      AND (
          realtime_departure_time IS NOT ?6
          OR delay_in_minutes IS NOT ?7
          OR cancelled IS NOT ?8
          OR platform IS NOT ?9
          OR realtime IS NOT ?10
      )
"#;

// Re-observation with no field changes: only the observation time moves.
const TOUCH_DEPARTURE: &str = r#"
    UPDATE departures SET fetched_at = ?11
    WHERE station_id = ?1
      AND transport_type = ?2
      AND label = ?3
      AND destination = ?4
      AND planned_departure_time = ?5
"#;

const SELECT_DEPARTURE: &str = r#"
    SELECT station_id, transport_type, label, destination, planned_departure_time,
           realtime_departure_time, delay_in_minutes, cancelled, platform, realtime,
           fetched_at
    FROM departures
    WHERE station_id = ?1
      AND transport_type = ?2
      AND label = ?3
      AND destination = ?4
      AND planned_departure_time = ?5
"#;

const UPSERT_STATION: &str = r#"
    INSERT INTO stations (
        station_id, name, place, latitude, longitude, diva_id, tariff_zones, products, last_seen_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (station_id) DO UPDATE SET
        name = excluded.name,
        place = excluded.place,
        latitude = excluded.latitude,
        longitude = excluded.longitude,
        diva_id = excluded.diva_id,
        tariff_zones = excluded.tariff_zones,
        products = excluded.products,
        last_seen_at = excluded.last_seen_at
"#;

/// SQLite store over a connection pool.
///
/// Runs in WAL mode with a busy timeout, so concurrent writers wait for the
/// lock instead of failing.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a `sqlite:` URL, creating the file and its directory if
    /// needed.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        if !url.starts_with("sqlite:") {
            return Err(StorageError::InvalidUrl {
                url: url.to_string(),
                message: "expected a sqlite: url".to_string(),
            });
        }

        let options = SqliteConnectOptions::from_str(url).map_err(|e| StorageError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Self::connect_with(options, max_connections).await
    }

    /// Open (or create) a database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new().filename(path.as_ref());
        Self::connect_with(options, 4).await
    }

    async fn connect_with(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<Self, StorageError> {
        let filename = options.get_filename();
        if let Some(parent) = filename.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::InvalidUrl {
                url: filename.display().to_string(),
                message: format!("failed to create database directory: {e}"),
            })?;
        }

        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Upsert catalog stations into the `stations` table.
    ///
    /// Returns the number of stations written.
    pub async fn sync_stations<'a>(
        &self,
        stations: impl IntoIterator<Item = &'a Station>,
    ) -> Result<usize, StorageError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut count = 0;

        for station in stations {
            let products = serde_json::to_string(&station.products).map_err(|e| {
                StorageError::Corrupt {
                    message: format!("products of {}: {e}", station.id),
                }
            })?;

            sqlx::query(UPSERT_STATION)
                .bind(station.id.as_str())
                .bind(&station.name)
                .bind(station.place.as_deref())
                .bind(station.latitude)
                .bind(station.longitude)
                .bind(station.diva_id)
                .bind(station.tariff_zones.as_deref())
                .bind(products)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            count += 1;
        }

        tx.commit().await?;
        info!(stations = count, "synced stations table");
        Ok(count)
    }

    /// Look up the stored record for a key.
    pub async fn find(&self, key: &DepartureKey) -> Result<Option<DepartureRecord>, StorageError> {
        let row = sqlx::query(SELECT_DEPARTURE)
            .bind(key.station_id.as_str())
            .bind(&key.transport_type)
            .bind(&key.label)
            .bind(&key.destination)
            .bind(key.planned_departure.timestamp())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Number of stored departure rows.
    pub async fn count_departures(&self) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM departures")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

impl DepartureStore for SqliteStore {
    async fn init_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(StorageError::Schema)?;
        }
        debug!("schema ready");
        Ok(())
    }

    async fn upsert(&self, record: &DepartureRecord) -> Result<UpsertOutcome, StorageError> {
        let mut tx = self.pool.begin().await?;

        let inserted = bind_record(sqlx::query(INSERT_DEPARTURE), record)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let outcome = if inserted == 1 {
            UpsertOutcome::Inserted
        } else {
            let updated = bind_record(sqlx::query(UPDATE_DEPARTURE), record)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if updated == 1 {
                UpsertOutcome::Updated
            } else {
                bind_record(sqlx::query(TOUCH_DEPARTURE), record)
                    .execute(&mut *tx)
                    .await?;
                UpsertOutcome::Unchanged
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

fn bind_record<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    record: &'q DepartureRecord,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let key = &record.key;
    query
        .bind(key.station_id.as_str())
        .bind(key.transport_type.as_str())
        .bind(key.label.as_str())
        .bind(key.destination.as_str())
        .bind(key.planned_departure.timestamp())
        .bind(record.realtime_departure.map(|t| t.timestamp()))
        .bind(record.delay_minutes)
        .bind(record.cancelled)
        .bind(record.platform.as_deref())
        .bind(record.is_realtime)
        .bind(record.fetched_at.timestamp())
}

fn record_from_row(row: &SqliteRow) -> Result<DepartureRecord, StorageError> {
    let station: String = row.try_get("station_id")?;
    let station_id = StationId::parse(&station).map_err(|e| StorageError::Corrupt {
        message: format!("station id {station:?}: {e}"),
    })?;

    Ok(DepartureRecord {
        key: DepartureKey {
            station_id,
            transport_type: row.try_get("transport_type")?,
            label: row.try_get("label")?,
            destination: row.try_get("destination")?,
            planned_departure: from_epoch(row.try_get("planned_departure_time")?)?,
        },
        realtime_departure: row
            .try_get::<Option<i64>, _>("realtime_departure_time")?
            .map(from_epoch)
            .transpose()?,
        delay_minutes: row.try_get("delay_in_minutes")?,
        cancelled: row.try_get("cancelled")?,
        platform: row.try_get("platform")?,
        is_realtime: row.try_get("realtime")?,
        fetched_at: from_epoch(row.try_get("fetched_at")?)?,
    })
}

fn from_epoch(secs: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| StorageError::Corrupt {
        message: format!("timestamp {secs} out of range"),
    })
}
