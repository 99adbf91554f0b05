//! City list fetched once at startup from `{base_url}/markers`.

use crate::city::{City, CityRecord};
use crate::config::FeedConfig;
use crate::pending::{Pending, Progress, TaskLost};
use reqwest::blocking::Client;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("malformed city feed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Lost(#[from] TaskLost),
}

pub enum StoreState<'a> {
    Loading,
    Loaded(&'a [City]),
    /// The feed could not be fetched or parsed. Not the same as zero cities.
    Failed(&'a FeedError),
}

pub struct CityStore {
    pending: Pending<Vec<City>, FeedError>,
    announced: bool,
}

impl CityStore {
    /// Issues the single fetch for this session on a background thread.
    pub fn load(config: &FeedConfig) -> Self {
        let url = markers_url(&config.base_url);
        let timeout = config.timeout();
        tracing::debug!("fetching cities from {url}");
        Self::from_pending(Pending::spawn("city-feed", move || fetch_cities(&url, timeout)))
    }

    pub fn from_cities(cities: Vec<City>) -> Self {
        Self::from_pending(Pending::ready(cities))
    }

    pub fn failed(error: FeedError) -> Self {
        Self::from_pending(Pending::failed(error))
    }

    pub fn from_pending(pending: Pending<Vec<City>, FeedError>) -> Self {
        Self { pending, announced: false }
    }

    pub fn state(&mut self) -> StoreState<'_> {
        let announce = !self.announced;
        match self.pending.poll() {
            Progress::Waiting => StoreState::Loading,
            Progress::Ready(cities) => {
                if announce {
                    tracing::info!("loaded {} cities", cities.len());
                    self.announced = true;
                }
                StoreState::Loaded(cities)
            }
            Progress::Failed(error) => {
                if announce {
                    tracing::warn!("city feed failed: {error}");
                    self.announced = true;
                }
                StoreState::Failed(error)
            }
        }
    }

    pub fn cities(&mut self) -> Option<&[City]> {
        match self.state() {
            StoreState::Loaded(cities) => Some(cities),
            _ => None,
        }
    }

    pub fn is_loading(&mut self) -> bool {
        matches!(self.state(), StoreState::Loading)
    }
}

pub fn markers_url(base_url: &str) -> String {
    format!("{}/markers", base_url.trim_end_matches('/'))
}

/// Fetches and parses the whole feed. The body is fully buffered first.
pub fn fetch_cities(url: &str, timeout: Duration) -> Result<Vec<City>, FeedError> {
    let http_err = |source| FeedError::Http { url: url.to_string(), source };

    let client = Client::builder().timeout(timeout).build().map_err(http_err)?;
    let response = client.get(url).send().map_err(http_err)?;
    let status = response.status();
    if !status.is_success() {
        return Err(FeedError::Status { url: url.to_string(), status: status.as_u16() });
    }
    let body = response.text().map_err(http_err)?;
    parse_cities(&body)
}

pub fn parse_cities(body: &str) -> Result<Vec<City>, FeedError> {
    let records: Vec<CityRecord> = serde_json::from_str(body)?;
    Ok(records.into_iter().map(City::from).collect())
}
