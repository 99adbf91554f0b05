//! The owned state of one map session.
//!
//! `Session` is driven by [`Session::pump`], called once per UI frame. Each
//! component only sees the capabilities it needs; map operations are gated on
//! a [`ReadyMap`] that exists only after the library loaded and the map was
//! built.

use crate::city::Position;
use crate::config::{AppConfig, ConfigError};
use crate::filter::{ExactMatch, FilterController, filter, find_exact};
use crate::geolocation::{Coordinates, GeolocationError, GeolocationHandler};
use crate::loader::{LibraryLoader, LoadError, Readiness};
use crate::pending::Pending;
use crate::popup::PopupManager;
use crate::sdk::{
    Control, ControlPosition, MapOptions, MapSdk, MarkerId, PinStyle, ReadyMap, SdkEvent,
};
use crate::store::{CityStore, FeedError, StoreState};
use crate::sync::{ActivePin, MarkerSynchronizer};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub map: MapOptions,
    pub search_position: ControlPosition,
    pub city_pins: PinStyle,
    pub user_pin: PinStyle,
    pub user_glyph: String,
    pub filter_debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let map = crate::config::MapConfig::default();
        Self {
            map: MapOptions { map_id: map.map_id, center: map.center, zoom: map.zoom },
            search_position: map.search_position,
            city_pins: PinStyle::CITY,
            user_pin: PinStyle::USER,
            user_glyph: "You".to_string(),
            filter_debounce: Duration::ZERO,
        }
    }
}

impl TryFrom<&AppConfig> for SessionConfig {
    type Error = ConfigError;

    fn try_from(cfg: &AppConfig) -> Result<Self, Self::Error> {
        let city_pins = cfg.city_pins.style()?;
        let user_pin = cfg.user_pin.style()?;
        if user_pin.background == city_pins.background {
            return Err(ConfigError::PinsIndistinct(user_pin.background));
        }
        Ok(Self {
            map: MapOptions {
                map_id: cfg.map.map_id.clone(),
                center: cfg.map.center,
                zoom: cfg.map.zoom,
            },
            search_position: cfg.map.search_position,
            city_pins,
            user_pin,
            user_glyph: cfg.user_pin.glyph.clone(),
            filter_debounce: Duration::from_millis(cfg.search.debounce_ms),
        })
    }
}

pub enum SessionStatus<'a> {
    Loading { library: bool, cities: bool },
    /// The map library failed to load. Terminal.
    MapUnavailable(&'a LoadError),
    Ready { shown: usize, total: usize, feed_error: Option<&'a FeedError> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Centered,
    NotFound,
    Ambiguous(usize),
    NotReady,
}

type Locate = Box<dyn FnOnce() -> Pending<Coordinates, GeolocationError>>;

pub struct Session<S> {
    config: SessionConfig,
    library: LibraryLoader<S>,
    cities: CityStore,
    locate: Option<Locate>,
    map: Option<ReadyMap>,
    filter: FilterController,
    /// Set once the first subset was requested after the city list arrived.
    seeded: bool,
    synchronizer: MarkerSynchronizer,
    popups: PopupManager,
    geolocation: GeolocationHandler,
}

impl<S: MapSdk> Session<S> {
    pub fn new<L>(
        config: SessionConfig,
        library: LibraryLoader<S>,
        cities: CityStore,
        locate: L,
    ) -> Self
    where
        L: FnOnce() -> Pending<Coordinates, GeolocationError> + 'static,
    {
        Self {
            filter: FilterController::new(config.filter_debounce),
            synchronizer: MarkerSynchronizer::new(config.city_pins),
            geolocation: GeolocationHandler::new(config.user_glyph.clone(), config.user_pin),
            popups: PopupManager::new(),
            locate: Some(Box::new(locate)),
            map: None,
            seeded: false,
            library,
            cities,
            config,
        }
    }

    /// Advances every component by one turn. Returns true when something
    /// visible changed.
    pub fn pump(&mut self, now: Instant) -> bool {
        let mut changed = self.refilter(now);

        let Readiness::Ready(sdk) = self.library.ready() else {
            return changed;
        };

        let map = match self.map {
            Some(map) => map,
            None => {
                let map = ReadyMap::new(sdk.create_map(&self.config.map));
                sdk.dock_control(map.id(), Control::SearchBox, self.config.search_position);
                if let Some(locate) = self.locate.take() {
                    self.geolocation.start(locate());
                }
                self.map = Some(map);
                changed = true;
                map
            }
        };

        if let Some(report) = self.synchronizer.settle(sdk, map) {
            if report.retired > 0 {
                let synchronizer = &self.synchronizer;
                self.popups.close_if_orphaned(sdk, |m| synchronizer.is_live(m));
            }
            changed = true;
        }

        for event in sdk.drain_events() {
            match event {
                SdkEvent::MarkerClicked(marker) => {
                    let Some(city) = self.synchronizer.city_for(marker) else {
                        tracing::debug!("click on unbound marker {marker:?}");
                        continue;
                    };
                    let content = city.popup_content(self.geolocation.user_position().as_ref());
                    let position = sdk.marker_position(marker).unwrap_or(city.position);
                    self.popups.open(sdk, map, marker, position, content);
                    changed = true;
                }
                SdkEvent::PopupClosed(popup) => self.popups.on_closed(popup),
            }
        }

        let was_waiting = self.geolocation.is_waiting();
        self.geolocation.poll(sdk, map);
        changed |= was_waiting && !self.geolocation.is_waiting();

        changed
    }

    /// Recomputes the filtered subset when the city list first arrives or
    /// when the search text is due.
    fn refilter(&mut self, now: Instant) -> bool {
        let all = match self.cities.state() {
            StoreState::Loaded(all) => all,
            StoreState::Loading | StoreState::Failed(_) => return false,
        };
        let due = self.filter.take_due(now).is_some();
        if self.seeded && !due {
            return false;
        }
        let term = self.filter.term();
        let subset = filter(all, term);
        tracing::debug!("filter {term:?}: {} of {} cities", subset.len(), all.len());
        self.synchronizer.request(subset);
        self.seeded = true;
        true
    }

    /// Search box content changed.
    pub fn on_search_input(&mut self, text: &str, now: Instant) {
        self.filter.input(text, now);
        self.refilter(now);
    }

    /// Enter in the search box: pan to the city whose name matches exactly.
    pub fn on_search_submit(&mut self, text: &str) -> SubmitOutcome {
        let Some(map) = self.map else {
            return SubmitOutcome::NotReady;
        };
        let Some(all) = self.cities.cities() else {
            return SubmitOutcome::NotReady;
        };
        let target = match find_exact(all, text) {
            ExactMatch::Unique(city) => city.position,
            ExactMatch::NotFound => return SubmitOutcome::NotFound,
            ExactMatch::Ambiguous(n) => {
                tracing::debug!("{n} cities named {text:?}, not moving");
                return SubmitOutcome::Ambiguous(n);
            }
        };
        let Readiness::Ready(sdk) = self.library.ready() else {
            return SubmitOutcome::NotReady;
        };
        sdk.pan_to(map.id(), target);
        SubmitOutcome::Centered
    }

    pub fn close_popup(&mut self) {
        if let Readiness::Ready(sdk) = self.library.ready() {
            self.popups.close(sdk);
        }
    }

    pub fn status(&mut self) -> SessionStatus<'_> {
        let shown = self.synchronizer.pins().len();
        let library = self.library.ready();
        let cities = self.cities.state();
        match (library, cities) {
            (Readiness::Unavailable(error), _) => SessionStatus::MapUnavailable(error),
            (Readiness::Loading, cities) => SessionStatus::Loading {
                library: true,
                cities: matches!(cities, StoreState::Loading),
            },
            (Readiness::Ready(_), StoreState::Loading) => {
                SessionStatus::Loading { library: false, cities: true }
            }
            (Readiness::Ready(_), StoreState::Loaded(all)) => {
                SessionStatus::Ready { shown, total: all.len(), feed_error: None }
            }
            (Readiness::Ready(_), StoreState::Failed(error)) => {
                SessionStatus::Ready { shown, total: 0, feed_error: Some(error) }
            }
        }
    }

    /// True once nothing is in flight: the library and feed have answered,
    /// the latest filter is built and the position request resolved.
    pub fn is_settled(&mut self) -> bool {
        if self.library.is_loading() || self.cities.is_loading() {
            return false;
        }
        if self.library.get_mut().is_none() {
            return true;
        }
        // Typing against a failed feed has nothing to apply.
        let filter_idle = !self.filter.is_dirty() || self.cities.cities().is_none();
        filter_idle
            && !self.synchronizer.has_pending()
            && self.map.is_some()
            && !self.geolocation.is_waiting()
    }

    pub fn sdk(&mut self) -> Option<&mut S> {
        self.library.get_mut()
    }

    pub fn map(&self) -> Option<ReadyMap> {
        self.map
    }

    pub fn pins(&self) -> &[ActivePin] {
        self.synchronizer.pins()
    }

    pub fn active_popup_anchor(&self) -> Option<MarkerId> {
        self.popups.anchor()
    }

    pub fn user_position(&self) -> Option<Position> {
        self.geolocation.user_position()
    }

    pub fn user_marker(&self) -> Option<MarkerId> {
        self.geolocation.user_marker()
    }

    pub fn geolocation_failure(&self) -> Option<&GeolocationError> {
        self.geolocation.failure()
    }

    /// Releases every pin and the popup.
    pub fn shutdown(&mut self) {
        if let Readiness::Ready(sdk) = self.library.ready() {
            self.popups.close(sdk);
            let removed = self.synchronizer.teardown(sdk);
            tracing::debug!("session shutdown released {removed} pins");
        }
    }
}
