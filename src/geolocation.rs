//! One-shot lookup of the viewer's position and the "you are here" pin.

use crate::city::Position;
use crate::config::{GeolocationConfig, LocatorKind};
use crate::pending::{Pending, Progress, TaskLost};
use crate::sdk::{MapFactory, MarkerFactory, MarkerId, PinFactory, PinStyle, ReadyMap};
use reqwest::blocking::Client;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeolocationError {
    #[error("geolocation is not supported")]
    Unsupported,
    #[error("position unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Lost(#[from] TaskLost),
}

/// Starts the position request described by `config`.
pub fn request_position(config: &GeolocationConfig) -> Pending<Coordinates, GeolocationError> {
    match config.provider {
        LocatorKind::Off => Pending::failed(GeolocationError::Unsupported),
        LocatorKind::Fixed => match config.fixed {
            Some(p) => Pending::ready(Coordinates { latitude: p.lat, longitude: p.lng }),
            None => Pending::failed(GeolocationError::Unavailable(
                "provider is \"fixed\" but [geolocation] fixed is not set".to_string(),
            )),
        },
        LocatorKind::Ip => {
            let timeout = Duration::from_secs(config.timeout_secs.max(1));
            Pending::spawn("geolocation", move || locate_by_ip(timeout))
        }
    }
}

const IPAPI_URL: &str = "https://ipapi.co/json/";
const IP_API_URL: &str = "http://ip-api.com/json/";

/// Approximate position from the public IP. Tries ipapi.co first, then ip-api.com.
fn locate_by_ip(timeout: Duration) -> Result<Coordinates, GeolocationError> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GeolocationError::Unavailable(e.to_string()))?;

    let mut last_error = String::new();
    for (url, lat_key, lon_key) in [(IPAPI_URL, "latitude", "longitude"), (IP_API_URL, "lat", "lon")]
    {
        match lookup(&client, url, lat_key, lon_key) {
            Ok(coords) => {
                tracing::debug!("location via {url}: {}, {}", coords.latitude, coords.longitude);
                return Ok(coords);
            }
            Err(e) => {
                tracing::debug!("location lookup via {url} failed: {e}");
                last_error = e;
            }
        }
    }
    Err(GeolocationError::Unavailable(last_error))
}

fn lookup(client: &Client, url: &str, lat_key: &str, lon_key: &str) -> Result<Coordinates, String> {
    let response = client.get(url).send().map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("{url} answered {}", response.status()));
    }
    let text = response.text().map_err(|e| e.to_string())?;
    parse_coordinates(&text, lat_key, lon_key)
}

fn parse_coordinates(body: &str, lat_key: &str, lon_key: &str) -> Result<Coordinates, String> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    match (value.get(lat_key).and_then(|v| v.as_f64()), value.get(lon_key).and_then(|v| v.as_f64()))
    {
        (Some(latitude), Some(longitude)) => {
            let coords = Coordinates { latitude, longitude };
            if coords.position().is_valid() {
                Ok(coords)
            } else {
                Err(format!("coordinates out of range: {latitude}, {longitude}"))
            }
        }
        _ => Err(format!("response has no {lat_key}/{lon_key}")),
    }
}

enum GeoState {
    Idle,
    Requested(Pending<Coordinates, GeolocationError>),
    Located { at: Coordinates, marker: MarkerId },
    Failed(GeolocationError),
}

/// Requests the viewer position once and places a single user pin.
pub struct GeolocationHandler {
    state: GeoState,
    glyph: String,
    style: PinStyle,
}

impl GeolocationHandler {
    pub fn new(glyph: impl Into<String>, style: PinStyle) -> Self {
        Self { state: GeoState::Idle, glyph: glyph.into(), style }
    }

    /// Accepts the request only once per session.
    pub fn start(&mut self, request: Pending<Coordinates, GeolocationError>) -> bool {
        if !matches!(self.state, GeoState::Idle) {
            tracing::debug!("geolocation already requested, ignoring");
            return false;
        }
        self.state = GeoState::Requested(request);
        true
    }

    /// Picks up the answer. On success the map is centered and the user pin is
    /// attached straight to the map, outside any cluster.
    pub fn poll<S>(&mut self, sdk: &mut S, map: ReadyMap) -> Option<Coordinates>
    where
        S: MapFactory + PinFactory + MarkerFactory,
    {
        let GeoState::Requested(pending) = &mut self.state else {
            return None;
        };
        let outcome = match pending.poll() {
            Progress::Waiting => return None,
            Progress::Ready(coords) => Ok(*coords),
            Progress::Failed(error) => Err(error.clone()),
        };

        match outcome {
            Ok(at) => {
                let position = at.position();
                sdk.pan_to(map.id(), position);
                let pin = sdk.create_pin(&self.glyph, &self.style);
                let marker = sdk.create_marker(position, pin, false);
                sdk.attach_marker(marker, map.id());
                tracing::info!("user located at {:.4}, {:.4}", at.latitude, at.longitude);
                self.state = GeoState::Located { at, marker };
                Some(at)
            }
            Err(error) => {
                tracing::warn!("geolocation failed, keeping default center: {error}");
                self.state = GeoState::Failed(error);
                None
            }
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.state, GeoState::Requested(_))
    }

    pub fn user_position(&self) -> Option<Position> {
        match &self.state {
            GeoState::Located { at, .. } => Some(at.position()),
            _ => None,
        }
    }

    pub fn user_marker(&self) -> Option<MarkerId> {
        match &self.state {
            GeoState::Located { marker, .. } => Some(*marker),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&GeolocationError> {
        match &self.state {
            GeoState::Failed(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Scene;
    use crate::sdk::{ClusterRegistry, MapOptions};
    use crossbeam_channel::unbounded;

    fn setup() -> (Scene, ReadyMap) {
        let mut scene = Scene::new();
        let map = scene.create_map(&MapOptions {
            map_id: "T".into(),
            center: Position::new(-31.56391, 147.154312),
            zoom: 7.0,
        });
        (scene, ReadyMap::new(map))
    }

    #[test]
    fn test_success_centers_and_pins_once() {
        let (mut scene, map) = setup();
        let cluster = scene.create_cluster(map.id());
        let mut geo = GeolocationHandler::new("You", PinStyle::USER);
        assert!(geo.start(Pending::ready(Coordinates { latitude: -33.87, longitude: 151.21 })));

        let located = geo.poll(&mut scene, map);
        assert_eq!(located, Some(Coordinates { latitude: -33.87, longitude: 151.21 }));
        assert_eq!(scene.map_center(map.id()), Some(Position::new(-33.87, 151.21)));

        let marker = geo.user_marker().unwrap();
        let pin = scene.marker(marker).unwrap();
        assert_eq!(pin.content.background, PinStyle::USER.background);
        assert_ne!(pin.content.background, PinStyle::CITY.background);
        assert!(!pin.interactive);
        assert_eq!(pin.map, Some(map.id()));
        assert_eq!(pin.cluster, None);
        assert_eq!(scene.cluster_len(cluster), 0);

        // Never recreated.
        assert!(!geo.start(Pending::ready(Coordinates { latitude: 0.0, longitude: 0.0 })));
        assert_eq!(geo.poll(&mut scene, map), None);
        assert_eq!(scene.live_marker_count(), 1);
    }

    #[test]
    fn test_failure_keeps_default_center() {
        let (mut scene, map) = setup();
        let mut geo = GeolocationHandler::new("You", PinStyle::USER);
        geo.start(Pending::failed(GeolocationError::Unavailable("denied".into())));
        assert_eq!(geo.poll(&mut scene, map), None);
        assert_eq!(scene.map_center(map.id()), Some(Position::new(-31.56391, 147.154312)));
        assert_eq!(scene.live_marker_count(), 0);
        assert!(matches!(geo.failure(), Some(GeolocationError::Unavailable(_))));
    }

    #[test]
    fn test_waits_for_answer() {
        let (mut scene, map) = setup();
        let (tx, rx) = unbounded();
        let mut geo = GeolocationHandler::new("You", PinStyle::USER);
        geo.start(Pending::from_receiver(rx));
        assert_eq!(geo.poll(&mut scene, map), None);
        assert!(geo.is_waiting());
        tx.send(Ok(Coordinates { latitude: 1.0, longitude: 2.0 })).unwrap();
        assert!(geo.poll(&mut scene, map).is_some());
        assert_eq!(geo.user_position(), Some(Position::new(1.0, 2.0)));
    }

    #[test]
    fn test_provider_off_is_unsupported() {
        let config = GeolocationConfig { provider: LocatorKind::Off, ..Default::default() };
        let mut pending = request_position(&config);
        assert_eq!(pending.poll(), Progress::Failed(&GeolocationError::Unsupported));
    }

    #[test]
    fn test_provider_fixed() {
        let config = GeolocationConfig {
            provider: LocatorKind::Fixed,
            fixed: Some(Position::new(60.17, 24.94)),
            ..Default::default()
        };
        let mut pending = request_position(&config);
        assert_eq!(
            pending.poll(),
            Progress::Ready(&Coordinates { latitude: 60.17, longitude: 24.94 })
        );

        let missing = GeolocationConfig { provider: LocatorKind::Fixed, ..Default::default() };
        assert!(matches!(
            request_position(&missing).poll(),
            Progress::Failed(GeolocationError::Unavailable(_))
        ));
    }

    #[test]
    fn test_parse_ip_lookup_bodies() {
        let ipapi = r#"{"ip":"1.2.3.4","latitude":-33.87,"longitude":151.21,"city":"Sydney"}"#;
        assert_eq!(
            parse_coordinates(ipapi, "latitude", "longitude"),
            Ok(Coordinates { latitude: -33.87, longitude: 151.21 })
        );
        let ip_api = r#"{"status":"success","lat":60.17,"lon":24.94}"#;
        assert!(parse_coordinates(ip_api, "lat", "lon").is_ok());
        assert!(parse_coordinates(ip_api, "latitude", "longitude").is_err());
        assert!(parse_coordinates(r#"{"lat":99.0,"lon":0.0}"#, "lat", "lon").is_err());
        assert!(parse_coordinates("rate limited", "lat", "lon").is_err());
    }
}
