//! Mock MVG client for testing without network access.
//!
//! Loads canned departure boards from JSON files and serves them as if
//! they were live API responses.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::domain::StationId;

use super::error::{ApiError, FetchError};
use super::types::{RawDeparture, decode_entries};

/// Mock MVG client that serves departure boards from JSON files.
///
/// Stations without a board file answer with a 404, which makes it easy to
/// stage partial failures.
#[derive(Debug, Clone, Default)]
pub struct MockMvgClient {
    boards: HashMap<StationId, Vec<RawDeparture>>,
}

impl MockMvgClient {
    /// Create a mock client by loading JSON files from a directory.
    ///
    /// Expects files named `{station id}.json` (e.g. `de:09162:6.json`), each
    /// holding the JSON array the departures endpoint would return.
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self, ApiError> {
        let data_dir = data_dir.as_ref();
        let mut boards = HashMap::new();

        let entries = std::fs::read_dir(data_dir).map_err(|e| {
            ApiError::Connection(format!("failed to read mock data directory: {e}"))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                ApiError::Connection(format!("failed to read directory entry: {e}"))
            })?;

            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| StationId::parse(s).ok())
            else {
                continue;
            };

            let json = std::fs::read_to_string(&path).map_err(|e| ApiError::Payload {
                message: format!("failed to read {}: {e}", path.display()),
                body: None,
            })?;

            let board: Vec<Value> = serde_json::from_str(&json).map_err(|e| ApiError::Payload {
                message: format!("failed to parse {}: {e}", path.display()),
                body: None,
            })?;

            boards.insert(id, decode_entries(board));
        }

        if boards.is_empty() {
            return Err(ApiError::Payload {
                message: format!("no mock board files found in {}", data_dir.display()),
                body: None,
            });
        }

        Ok(Self { boards })
    }

    /// Replace (or add) the board served for `station`.
    pub fn with_board(mut self, station: StationId, board: Vec<RawDeparture>) -> Self {
        self.boards.insert(station, board);
        self
    }

    /// Stations that have mock data, sorted.
    pub fn available_stations(&self) -> Vec<StationId> {
        let mut ids: Vec<StationId> = self.boards.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Mimics [`super::MvgClient::fetch_departures`].
    pub async fn fetch_departures(
        &self,
        station: &StationId,
    ) -> Result<Vec<RawDeparture>, FetchError> {
        self.boards.get(station).cloned().ok_or_else(|| {
            FetchError::new(
                station.clone(),
                ApiError::Status {
                    status: 404,
                    message: format!("no mock data for station {station}"),
                },
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn loads_boards_from_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("de:09162:6.json"),
            r#"[{"plannedDepartureTime": 1700000000, "transportType": "TRAM", "label": "19"}]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mock = MockMvgClient::new(dir.path()).unwrap();
        let id = StationId::parse("de:09162:6").unwrap();
        assert_eq!(mock.available_stations(), vec![id.clone()]);

        let board = mock.fetch_departures(&id).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].transport_type.as_deref(), Some("TRAM"));
    }

    #[tokio::test]
    async fn unknown_station_is_404() {
        let mock = MockMvgClient::default()
            .with_board(StationId::parse("a").unwrap(), Vec::new());

        let missing = StationId::parse("b").unwrap();
        let err = mock.fetch_departures(&missing).await.unwrap_err();
        assert_eq!(err.station, missing);
        assert!(matches!(err.source, ApiError::Status { status: 404, .. }));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(MockMvgClient::new(dir.path()).is_err());
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("s1.json"), "{not json").unwrap();
        assert!(matches!(
            MockMvgClient::new(dir.path()),
            Err(ApiError::Payload { .. })
        ));
    }
}
