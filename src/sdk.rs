//! Capabilities the engine consumes from a map runtime.
//!
//! Objects living inside the runtime are referred to by opaque ids. The
//! engine never holds the objects themselves, so a runtime is free to keep
//! them in whatever retained structure it renders from.

use crate::city::Position;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PopupId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(pub u64);

/// 24-bit sRGB color, written `#rrggbb` in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);
    pub const BLACK: Color = Color::rgb(0x00, 0x00, 0x00);
    pub const BLUE: Color = Color::rgb(0x00, 0x00, 0xff);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid color {0:?}, expected #rrggbb")]
pub struct ParseColorError(pub String);

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().strip_prefix('#').ok_or_else(|| ParseColorError(s.to_string()))?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(ParseColorError(s.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ParseColorError(s.to_string()))
        };
        Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Colors of a pin glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinStyle {
    pub glyph_color: Color,
    pub background: Color,
    pub border_color: Color,
}

impl PinStyle {
    pub const CITY: PinStyle =
        PinStyle { glyph_color: Color::WHITE, background: Color::BLACK, border_color: Color::BLACK };
    pub const USER: PinStyle =
        PinStyle { glyph_color: Color::WHITE, background: Color::BLUE, border_color: Color::BLUE };
}

/// Rendered content of a marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinElement {
    pub glyph: String,
    pub glyph_color: Color,
    pub background: Color,
    pub border_color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapOptions {
    pub map_id: String,
    pub center: Position,
    pub zoom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ControlPosition {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Custom controls the engine docks into the map viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    SearchBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkEvent {
    MarkerClicked(MarkerId),
    /// The user dismissed a popup from the map itself.
    PopupClosed(PopupId),
}

pub trait MapFactory {
    fn create_map(&mut self, options: &MapOptions) -> MapId;
    fn dock_control(&mut self, map: MapId, control: Control, position: ControlPosition);
    fn pan_to(&mut self, map: MapId, position: Position);
    fn map_center(&self, map: MapId) -> Option<Position>;
}

pub trait PinFactory {
    fn create_pin(&mut self, glyph: &str, style: &PinStyle) -> PinElement {
        PinElement {
            glyph: glyph.to_string(),
            glyph_color: style.glyph_color,
            background: style.background,
            border_color: style.border_color,
        }
    }
}

pub trait MarkerFactory {
    /// Creates a detached marker. Interactive markers report clicks through
    /// [`EventSource::drain_events`].
    fn create_marker(&mut self, position: Position, content: PinElement, interactive: bool)
    -> MarkerId;
    fn attach_marker(&mut self, marker: MarkerId, map: MapId);
    /// Detaches and destroys the marker. Unknown ids are ignored.
    fn remove_marker(&mut self, marker: MarkerId);
    fn marker_position(&self, marker: MarkerId) -> Option<Position>;
}

pub trait PopupFactory {
    fn open_popup(
        &mut self,
        map: MapId,
        anchor: MarkerId,
        position: Position,
        content: String,
    ) -> PopupId;
    fn close_popup(&mut self, popup: PopupId);
}

pub trait ClusterRegistry {
    fn create_cluster(&mut self, map: MapId) -> ClusterId;
    /// Registers markers in one batch and attaches them to the cluster's map.
    fn add_markers(&mut self, cluster: ClusterId, markers: &[MarkerId]);
    /// Unregisters every member and detaches it from the map.
    fn clear_markers(&mut self, cluster: ClusterId);
    fn cluster_len(&self, cluster: ClusterId) -> usize;
}

pub trait EventSource {
    fn drain_events(&mut self) -> Vec<SdkEvent>;
}

/// The full capability set handed out by the library loader.
pub trait MapSdk:
    MapFactory + PinFactory + MarkerFactory + PopupFactory + ClusterRegistry + EventSource
{
}

impl<T> MapSdk for T where
    T: MapFactory + PinFactory + MarkerFactory + PopupFactory + ClusterRegistry + EventSource
{
}

/// Proof that the map library is loaded and the session map exists.
///
/// Only the session mints these, so map operations cannot run against a map
/// that does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyMap {
    id: MapId,
}

impl ReadyMap {
    pub(crate) fn new(id: MapId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> MapId {
        self.id
    }
}
