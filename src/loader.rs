use crate::pending::{Pending, Progress, TaskLost};
use reqwest::blocking::Client;
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("map service unreachable: {0}")]
    Unreachable(String),
    #[error("map service answered {status} for {url}")]
    Rejected { url: String, status: u16 },
    #[error(transparent)]
    Lost(#[from] TaskLost),
}

pub enum Readiness<'a, S> {
    Loading,
    Ready(&'a mut S),
    /// Terminal for the session; the map never becomes usable.
    Unavailable(&'a LoadError),
}

/// Acquires the map capability set once and hands it out for the rest of the
/// session.
pub struct LibraryLoader<S> {
    pending: Pending<S, LoadError>,
    announced: bool,
}

impl<S: Send + 'static> LibraryLoader<S> {
    pub fn spawn<F>(load: F) -> Self
    where
        F: FnOnce() -> Result<S, LoadError> + Send + 'static,
    {
        Self { pending: Pending::spawn("map-library", load), announced: false }
    }
}

impl<S> LibraryLoader<S> {
    pub fn ready_now(sdk: S) -> Self {
        Self { pending: Pending::ready(sdk), announced: false }
    }

    pub fn failed(error: LoadError) -> Self {
        Self { pending: Pending::failed(error), announced: false }
    }

    pub fn from_pending(pending: Pending<S, LoadError>) -> Self {
        Self { pending, announced: false }
    }

    pub fn ready(&mut self) -> Readiness<'_, S> {
        let announce = !self.announced;
        match self.pending.poll_mut() {
            Progress::Waiting => Readiness::Loading,
            Progress::Ready(sdk) => {
                if announce {
                    tracing::info!("map library ready");
                    self.announced = true;
                }
                Readiness::Ready(sdk)
            }
            Progress::Failed(error) => {
                if announce {
                    tracing::warn!("map library unavailable: {error}");
                    self.announced = true;
                }
                Readiness::Unavailable(error)
            }
        }
    }

    pub fn is_loading(&mut self) -> bool {
        matches!(self.ready(), Readiness::Loading)
    }

    pub fn get_mut(&mut self) -> Option<&mut S> {
        match self.ready() {
            Readiness::Ready(sdk) => Some(sdk),
            _ => None,
        }
    }
}

/// Checks that the map tile service answers before any map is built.
pub fn probe_map_service(url: &str, timeout: Duration) -> Result<(), LoadError> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LoadError::Unreachable(e.to_string()))?;
    let response = client.get(url).send().map_err(|e| LoadError::Unreachable(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(LoadError::Rejected { url: url.to_string(), status: status.as_u16() });
    }
    tracing::debug!("map service probe {url}: {status}");
    Ok(())
}
