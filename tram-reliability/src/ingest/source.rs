//! Where departure boards come from.

use std::future::Future;

use crate::domain::StationId;
use crate::mvg::{FetchError, MockMvgClient, MvgClient, RawDeparture};

/// Fetches the raw departure board of one station.
///
/// One round trip per call and no retries. Implementations must be safe to
/// call concurrently through a shared reference.
pub trait DepartureSource {
    fn fetch(
        &self,
        station: &StationId,
    ) -> impl Future<Output = Result<Vec<RawDeparture>, FetchError>>;
}

impl DepartureSource for MvgClient {
    async fn fetch(&self, station: &StationId) -> Result<Vec<RawDeparture>, FetchError> {
        self.fetch_departures(station).await
    }
}

impl DepartureSource for MockMvgClient {
    async fn fetch(&self, station: &StationId) -> Result<Vec<RawDeparture>, FetchError> {
        self.fetch_departures(station).await
    }
}

/// Either the live API or canned boards, chosen at startup.
#[derive(Debug, Clone)]
pub enum BoardSource {
    Live(MvgClient),
    Mock(MockMvgClient),
}

impl DepartureSource for BoardSource {
    async fn fetch(&self, station: &StationId) -> Result<Vec<RawDeparture>, FetchError> {
        match self {
            BoardSource::Live(client) => client.fetch_departures(station).await,
            BoardSource::Mock(client) => client.fetch_departures(station).await,
        }
    }
}
