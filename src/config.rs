use crate::city::Position;
use crate::sdk::{Color, ControlPosition, ParseColorError, PinStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "citymap.conf";

/// Environment override for `[feed] base_url`.
pub const BACKEND_URL_ENV: &str = "CITYMAP_BACKEND_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config directory found")]
    NoConfigDir,
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("[{section}] {source}")]
    Color {
        section: &'static str,
        #[source]
        source: ParseColorError,
    },
    #[error("[user_pin] background {0} is the same as [city_pins] background")]
    PinsIndistinct(Color),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:4567".to_string(), timeout_secs: 10 }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub center: Position,
    pub zoom: f64,
    pub map_id: String,
    pub search_position: ControlPosition,
    /// Fetched once at startup to decide whether the map can be shown at all.
    pub tile_probe_url: String,
    /// Grid cell size in screen points used for clustering.
    pub cluster_radius: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: Position::new(-31.56391, 147.154312),
            zoom: 7.0,
            map_id: "DEMO_MAP_ID".to_string(),
            search_position: ControlPosition::TopRight,
            tile_probe_url: "https://tile.openstreetmap.org/0/0/0.png".to_string(),
            cluster_radius: 60.0,
        }
    }
}

fn parse_style(
    section: &'static str,
    glyph_color: &str,
    background: &str,
    border_color: &str,
) -> Result<PinStyle, ConfigError> {
    let parse =
        |s: &str| s.parse::<Color>().map_err(|source| ConfigError::Color { section, source });
    Ok(PinStyle {
        glyph_color: parse(glyph_color)?,
        background: parse(background)?,
        border_color: parse(border_color)?,
    })
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PinConfig {
    pub glyph_color: String,
    pub background: String,
    pub border_color: String,
}

impl PinConfig {
    pub fn style(&self) -> Result<PinStyle, ConfigError> {
        parse_style("city_pins", &self.glyph_color, &self.background, &self.border_color)
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        let style = PinStyle::CITY;
        Self {
            glyph_color: style.glyph_color.to_string(),
            background: style.background.to_string(),
            border_color: style.border_color.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct UserPinConfig {
    pub glyph: String,
    pub glyph_color: String,
    pub background: String,
    pub border_color: String,
}

impl UserPinConfig {
    pub fn style(&self) -> Result<PinStyle, ConfigError> {
        parse_style("user_pin", &self.glyph_color, &self.background, &self.border_color)
    }
}

impl Default for UserPinConfig {
    fn default() -> Self {
        let style = PinStyle::USER;
        Self {
            glyph: "You".to_string(),
            glyph_color: style.glyph_color.to_string(),
            background: style.background.to_string(),
            border_color: style.border_color.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub placeholder: String,
    /// 0 recomputes the filter on every keystroke.
    pub debounce_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { placeholder: "Search city".to_string(), debounce_ms: 0 }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LocatorKind {
    /// Approximate position from the public IP address.
    #[default]
    Ip,
    /// Position taken from `[geolocation] fixed`.
    Fixed,
    Off,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GeolocationConfig {
    pub provider: LocatorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<Position>,
    pub timeout_secs: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self { provider: LocatorKind::Ip, fixed: None, timeout_secs: 5 }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GuiConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub font_scale: Option<f32>,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self { width: Some(1280), height: Some(800), font_scale: Some(1.0) }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub city_pins: PinConfig,
    #[serde(default)]
    pub user_pin: UserPinConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    #[serde(default)]
    pub gui: GuiConfig,
}

const SECTIONS: [&str; 7] = ["feed", "map", "city_pins", "user_pin", "search", "geolocation", "gui"];

impl AppConfig {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Reads the config file, creating it with defaults if it does not exist.
    /// Sections missing from an existing file are written back with defaults.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::Io { path: path.to_path_buf(), source };

        if path.exists() {
            let content = fs::read_to_string(path).map_err(io_err)?;
            tracing::debug!("loading config from {}", path.display());
            let cfg = Self::parse(&content)?;

            let raw_value: toml::Table = toml::from_str(&content)?;
            let missing: Vec<&str> =
                SECTIONS.iter().copied().filter(|s| !raw_value.contains_key(*s)).collect();
            if !missing.is_empty() {
                tracing::debug!("writing back default sections: {}", missing.join(", "));
                fs::write(path, toml::to_string_pretty(&cfg)?).map_err(io_err)?;
            }
            Ok(cfg)
        } else {
            tracing::info!("config file does not exist, creating {}", path.display());
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
            let cfg = Self::default();
            fs::write(path, toml::to_string_pretty(&cfg)?).map_err(io_err)?;
            Ok(cfg)
        }
    }

    /// Applies the backend URL environment override.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV)
            && !url.trim().is_empty()
        {
            self.feed.base_url = url.trim().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let cfg = AppConfig::parse("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.map.center, Position::new(-31.56391, 147.154312));
        assert_eq!(cfg.map.zoom, 7.0);
        assert_eq!(cfg.map.search_position, ControlPosition::TopRight);
    }

    #[test]
    fn test_partial_sections() {
        let cfg = AppConfig::parse(
            r##"
[feed]
base_url = "https://cities.example.org"
timeout_secs = 3

[map]
center = { lat = -33.87, lng = 151.21 }
zoom = 5.0
map_id = "X"
search_position = "bottom-left"
tile_probe_url = "https://tiles.example.org/0/0/0.png"
cluster_radius = 40.0

[user_pin]
glyph = "Me"
glyph_color = "#ffffff"
background = "#ff0000"
border_color = "#ff0000"
"##,
        )
        .unwrap();
        assert_eq!(cfg.feed.base_url, "https://cities.example.org");
        assert_eq!(cfg.feed.timeout(), Duration::from_secs(3));
        assert_eq!(cfg.map.search_position, ControlPosition::BottomLeft);
        assert_eq!(cfg.user_pin.glyph, "Me");
        assert_eq!(cfg.user_pin.style().unwrap().background, Color::rgb(255, 0, 0));
        assert_eq!(cfg.search, SearchConfig::default());
    }

    #[test]
    fn test_default_pin_styles() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.city_pins.style().unwrap(), PinStyle::CITY);
        assert_eq!(cfg.user_pin.style().unwrap(), PinStyle::USER);
    }

    #[test]
    fn test_partial_pin_sections_keep_their_own_defaults() {
        let cfg = AppConfig::parse(
            r##"
[city_pins]
background = "#ff0000"

[user_pin]
glyph = "Me"
"##,
        )
        .unwrap();
        let city = cfg.city_pins.style().unwrap();
        assert_eq!(city.background, Color::rgb(255, 0, 0));
        assert_eq!(city.glyph_color, PinStyle::CITY.glyph_color);
        assert_eq!(city.border_color, PinStyle::CITY.border_color);
        assert_eq!(cfg.user_pin.glyph, "Me");
        assert_eq!(cfg.user_pin.style().unwrap(), PinStyle::USER);
    }

    #[test]
    fn test_bad_color_names_section() {
        let mut cfg = AppConfig::default();
        cfg.city_pins.background = "black".into();
        let err = cfg.city_pins.style().unwrap_err();
        assert!(err.to_string().starts_with("[city_pins]"), "got {err}");
    }

    #[test]
    fn test_geolocation_provider_names() {
        let cfg = AppConfig::parse(
            r#"
[geolocation]
provider = "fixed"
fixed = { lat = 60.17, lng = 24.94 }
timeout_secs = 2
"#,
        )
        .unwrap();
        assert_eq!(cfg.geolocation.provider, LocatorKind::Fixed);
        assert_eq!(cfg.geolocation.fixed, Some(Position::new(60.17, 24.94)));
    }

    #[test]
    fn test_load_or_create_writes_missing_sections() {
        let dir = std::env::temp_dir().join(format!("citymap-config-{}", std::process::id()));
        let path = dir.join(CONFIG_FILE_NAME);
        let _ = fs::remove_dir_all(&dir);

        let created = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(created, AppConfig::default());
        assert!(path.exists());

        fs::write(&path, "[feed]\nbase_url = \"http://a\"\ntimeout_secs = 1\n").unwrap();
        let loaded = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(loaded.feed.base_url, "http://a");
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("[geolocation]"));
        assert!(rewritten.contains("http://a"));

        let _ = fs::remove_dir_all(&dir);
    }
}
