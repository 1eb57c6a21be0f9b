//! MVG HTTP client.

use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, trace};

use crate::domain::{Station, StationId};

use super::error::{ApiError, FetchError};
use super::types::{RawDeparture, StationDto, decode_entries};

/// Default base URL for the MVG API.
pub const DEFAULT_BASE_URL: &str = "https://www.mvg.de";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

const STATIONS_PATH: &str = "/.rest/zdm/stations";
const DEPARTURES_PATH: &str = "/api/bgw-pt/v3/departures";

const DEFAULT_USER_AGENT: &str = concat!("tram-reliability/", env!("CARGO_PKG_VERSION"));

/// How much of an unparseable body to keep for diagnostics.
const BODY_SNIPPET_CHARS: usize = 500;

/// Configuration for the MVG client.
#[derive(Debug, Clone)]
pub struct MvgConfig {
    /// Base URL for the API (defaults to production MVG)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl MvgConfig {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }
}

impl Default for MvgConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Client for the public MVG endpoints: station metadata and per-station
/// departure boards.
#[derive(Debug, Clone)]
pub struct MvgClient {
    http: reqwest::Client,
    base_url: String,
}

impl MvgClient {
    pub fn new(config: MvgConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }

    /// Fetch the full station list.
    ///
    /// Entries without a usable id or name are dropped.
    pub async fn fetch_stations(&self) -> Result<Vec<Station>, ApiError> {
        let url = format!("{}{}", self.base_url, STATIONS_PATH);
        let entries = self.get_json_array(&url, &[]).await?;

        let total = entries.len();
        let stations: Vec<Station> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<StationDto>(entry).ok())
            .filter_map(StationDto::into_station)
            .collect();

        debug!(total, kept = stations.len(), "fetched station metadata");
        Ok(stations)
    }

    /// Fetch the current departures board for one station.
    pub async fn fetch_departures(
        &self,
        station: &StationId,
    ) -> Result<Vec<RawDeparture>, FetchError> {
        let url = format!("{}{}", self.base_url, DEPARTURES_PATH);

        let entries = self
            .get_json_array(&url, &[("globalId", station.as_str())])
            .await
            .map_err(|e| FetchError::new(station.clone(), e))?;

        trace!(station = %station, entries = entries.len(), "fetched departures");
        Ok(decode_entries(entries))
    }

    async fn get_json_array(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<Value>, ApiError> {
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: body.chars().take(BODY_SNIPPET_CHARS).collect(),
            });
        }

        let body = response.text().await?;

        serde_json::from_str::<Vec<Value>>(&body).map_err(|e| ApiError::Payload {
            message: e.to_string(),
            body: Some(body.chars().take(BODY_SNIPPET_CHARS).collect()),
        })
    }
}
