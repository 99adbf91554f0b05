//! In-process map runtime.
//!
//! `Scene` keeps every object the engine creates (maps, markers, clusters,
//! popups) in plain tables and implements all capability traits on top of
//! them. The GUI renders a `Scene` every frame; the headless mode and the
//! tests use it as is.

use crate::city::Position;
use crate::sdk::{
    ClusterId, ClusterRegistry, Control, ControlPosition, EventSource, MapFactory, MapId,
    MapOptions, MarkerFactory, MarkerId, PinElement, PinFactory, PopupFactory, PopupId, SdkEvent,
};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct MapState {
    pub center: Position,
    pub zoom: f64,
    pub controls: Vec<(Control, ControlPosition)>,
    /// Pan requested by the engine that the renderer has not applied yet.
    pub pending_pan: Option<Position>,
}

#[derive(Debug, Clone)]
pub struct SceneMarker {
    pub position: Position,
    pub content: PinElement,
    pub interactive: bool,
    pub map: Option<MapId>,
    pub cluster: Option<ClusterId>,
}

#[derive(Debug, Clone)]
pub struct SceneCluster {
    pub map: MapId,
    pub members: Vec<MarkerId>,
}

#[derive(Debug, Clone)]
pub struct ScenePopup {
    pub map: MapId,
    pub anchor: MarkerId,
    pub position: Position,
    pub content: String,
}

/// Mutations recorded when journaling is enabled.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneOp {
    CreateMarker(MarkerId),
    AttachMarker(MarkerId),
    RemoveMarker(MarkerId),
    AddToCluster(ClusterId, usize),
    ClearCluster(ClusterId),
    OpenPopup(PopupId),
    ClosePopup(PopupId),
    Pan(MapId, Position),
}

#[derive(Debug, Default)]
pub struct Scene {
    next_id: u64,
    maps: FxHashMap<MapId, MapState>,
    markers: FxHashMap<MarkerId, SceneMarker>,
    clusters: FxHashMap<ClusterId, SceneCluster>,
    popups: FxHashMap<PopupId, ScenePopup>,
    events: VecDeque<SdkEvent>,
    journal: Option<Vec<SceneOp>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal() -> Self {
        Self { journal: Some(Vec::new()), ..Self::default() }
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, op: SceneOp) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(op);
        }
    }

    pub fn journal(&self) -> &[SceneOp] {
        self.journal.as_deref().unwrap_or(&[])
    }

    pub fn clear_journal(&mut self) {
        if let Some(journal) = self.journal.as_mut() {
            journal.clear();
        }
    }

    pub fn map(&self, map: MapId) -> Option<&MapState> {
        self.maps.get(&map)
    }

    pub fn map_count(&self) -> usize {
        self.maps.len()
    }

    /// Renderer side: take the pan the engine asked for.
    pub fn take_pending_pan(&mut self, map: MapId) -> Option<Position> {
        self.maps.get_mut(&map).and_then(|m| m.pending_pan.take())
    }

    /// Renderer side: report where the user dragged/zoomed the map to.
    pub fn set_viewport(&mut self, map: MapId, center: Position, zoom: f64) {
        if let Some(state) = self.maps.get_mut(&map) {
            state.center = center;
            state.zoom = zoom;
        }
    }

    pub fn marker(&self, marker: MarkerId) -> Option<&SceneMarker> {
        self.markers.get(&marker)
    }

    pub fn live_marker_count(&self) -> usize {
        self.markers.len()
    }

    /// Markers attached to `map` that no cluster owns, e.g. the user pin.
    pub fn loose_markers(&self, map: MapId) -> impl Iterator<Item = (MarkerId, &SceneMarker)> {
        self.markers
            .iter()
            .filter(move |(_, m)| m.map == Some(map) && m.cluster.is_none())
            .map(|(id, m)| (*id, m))
    }

    pub fn attached_count(&self, map: MapId) -> usize {
        self.markers.values().filter(|m| m.map == Some(map)).count()
    }

    pub fn clusters_on(&self, map: MapId) -> impl Iterator<Item = (ClusterId, &SceneCluster)> {
        self.clusters.iter().filter(move |(_, c)| c.map == map).map(|(id, c)| (*id, c))
    }

    pub fn cluster(&self, cluster: ClusterId) -> Option<&SceneCluster> {
        self.clusters.get(&cluster)
    }

    pub fn popups(&self) -> impl Iterator<Item = (PopupId, &ScenePopup)> {
        self.popups.iter().map(|(id, p)| (*id, p))
    }

    pub fn open_popup_count(&self) -> usize {
        self.popups.len()
    }

    /// Input side: the user clicked an interactive marker.
    pub fn click_marker(&mut self, marker: MarkerId) {
        match self.markers.get(&marker) {
            Some(m) if m.interactive && m.map.is_some() => {
                self.events.push_back(SdkEvent::MarkerClicked(marker));
            }
            _ => tracing::trace!("ignoring click on {marker:?}"),
        }
    }

    /// Input side: the user dismissed a popup.
    pub fn dismiss_popup(&mut self, popup: PopupId) {
        if self.popups.remove(&popup).is_some() {
            self.record(SceneOp::ClosePopup(popup));
            self.events.push_back(SdkEvent::PopupClosed(popup));
        }
    }

    fn detach(&mut self, marker: MarkerId) {
        if let Some(m) = self.markers.get_mut(&marker) {
            m.map = None;
            m.cluster = None;
        }
    }
}

impl MapFactory for Scene {
    fn create_map(&mut self, options: &MapOptions) -> MapId {
        let id = MapId(self.next());
        self.maps.insert(
            id,
            MapState {
                center: options.center,
                zoom: options.zoom,
                controls: Vec::new(),
                pending_pan: Some(options.center),
            },
        );
        id
    }

    fn dock_control(&mut self, map: MapId, control: Control, position: ControlPosition) {
        if let Some(state) = self.maps.get_mut(&map) {
            state.controls.retain(|(c, _)| *c != control);
            state.controls.push((control, position));
        }
    }

    fn pan_to(&mut self, map: MapId, position: Position) {
        if let Some(state) = self.maps.get_mut(&map) {
            state.center = position;
            state.pending_pan = Some(position);
            self.record(SceneOp::Pan(map, position));
        }
    }

    fn map_center(&self, map: MapId) -> Option<Position> {
        self.maps.get(&map).map(|m| m.center)
    }
}

impl PinFactory for Scene {}

impl MarkerFactory for Scene {
    fn create_marker(
        &mut self,
        position: Position,
        content: PinElement,
        interactive: bool,
    ) -> MarkerId {
        let id = MarkerId(self.next());
        self.markers.insert(id, SceneMarker { position, content, interactive, map: None, cluster: None });
        self.record(SceneOp::CreateMarker(id));
        id
    }

    fn attach_marker(&mut self, marker: MarkerId, map: MapId) {
        if let Some(m) = self.markers.get_mut(&marker) {
            m.map = Some(map);
            self.record(SceneOp::AttachMarker(marker));
        }
    }

    fn remove_marker(&mut self, marker: MarkerId) {
        let Some(removed) = self.markers.remove(&marker) else {
            return;
        };
        if let Some(cluster) = removed.cluster.and_then(|c| self.clusters.get_mut(&c)) {
            cluster.members.retain(|m| *m != marker);
        }
        self.record(SceneOp::RemoveMarker(marker));
    }

    fn marker_position(&self, marker: MarkerId) -> Option<Position> {
        self.markers.get(&marker).map(|m| m.position)
    }
}

impl PopupFactory for Scene {
    fn open_popup(
        &mut self,
        map: MapId,
        anchor: MarkerId,
        position: Position,
        content: String,
    ) -> PopupId {
        let id = PopupId(self.next());
        self.popups.insert(id, ScenePopup { map, anchor, position, content });
        self.record(SceneOp::OpenPopup(id));
        id
    }

    fn close_popup(&mut self, popup: PopupId) {
        if self.popups.remove(&popup).is_some() {
            self.record(SceneOp::ClosePopup(popup));
        }
    }
}

impl ClusterRegistry for Scene {
    fn create_cluster(&mut self, map: MapId) -> ClusterId {
        let id = ClusterId(self.next());
        self.clusters.insert(id, SceneCluster { map, members: Vec::new() });
        id
    }

    fn add_markers(&mut self, cluster: ClusterId, markers: &[MarkerId]) {
        let Some(map) = self.clusters.get(&cluster).map(|c| c.map) else {
            return;
        };
        let mut added = Vec::with_capacity(markers.len());
        for id in markers {
            if let Some(m) = self.markers.get_mut(id) {
                m.map = Some(map);
                m.cluster = Some(cluster);
                added.push(*id);
            }
        }
        let count = added.len();
        if let Some(c) = self.clusters.get_mut(&cluster) {
            c.members.extend(added);
        }
        self.record(SceneOp::AddToCluster(cluster, count));
    }

    fn clear_markers(&mut self, cluster: ClusterId) {
        let members = match self.clusters.get_mut(&cluster) {
            Some(c) => std::mem::take(&mut c.members),
            None => return,
        };
        for marker in members {
            self.detach(marker);
        }
        self.record(SceneOp::ClearCluster(cluster));
    }

    fn cluster_len(&self, cluster: ClusterId) -> usize {
        self.clusters.get(&cluster).map_or(0, |c| c.members.len())
    }
}

impl EventSource for Scene {
    fn drain_events(&mut self) -> Vec<SdkEvent> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::PinStyle;

    fn options() -> MapOptions {
        MapOptions { map_id: "T".into(), center: Position::new(0.0, 0.0), zoom: 3.0 }
    }

    fn marker(scene: &mut Scene, lat: f64) -> MarkerId {
        let pin = scene.create_pin("x", &PinStyle::CITY);
        scene.create_marker(Position::new(lat, 0.0), pin, true)
    }

    #[test]
    fn test_cluster_batch_attaches_and_clear_detaches() {
        let mut scene = Scene::new();
        let map = scene.create_map(&options());
        let cluster = scene.create_cluster(map);
        let a = marker(&mut scene, 1.0);
        let b = marker(&mut scene, 2.0);
        assert_eq!(scene.attached_count(map), 0);

        scene.add_markers(cluster, &[a, b]);
        assert_eq!(scene.cluster_len(cluster), 2);
        assert_eq!(scene.attached_count(map), 2);

        scene.clear_markers(cluster);
        assert_eq!(scene.cluster_len(cluster), 0);
        assert_eq!(scene.attached_count(map), 0);
        // Cleared markers still exist until removed.
        assert_eq!(scene.live_marker_count(), 2);
    }

    #[test]
    fn test_remove_marker_leaves_cluster() {
        let mut scene = Scene::new();
        let map = scene.create_map(&options());
        let cluster = scene.create_cluster(map);
        let a = marker(&mut scene, 1.0);
        scene.add_markers(cluster, &[a]);
        scene.remove_marker(a);
        assert_eq!(scene.cluster_len(cluster), 0);
        assert_eq!(scene.live_marker_count(), 0);
        scene.remove_marker(a);
    }

    #[test]
    fn test_click_only_reports_attached_interactive_markers() {
        let mut scene = Scene::new();
        let map = scene.create_map(&options());
        let clickable = marker(&mut scene, 1.0);
        let pin = scene.create_pin("You", &PinStyle::USER);
        let passive = scene.create_marker(Position::new(5.0, 5.0), pin, false);
        scene.attach_marker(passive, map);

        scene.click_marker(clickable); // not attached yet
        scene.attach_marker(clickable, map);
        scene.click_marker(clickable);
        scene.click_marker(passive);
        assert_eq!(scene.drain_events(), vec![SdkEvent::MarkerClicked(clickable)]);
        assert!(scene.drain_events().is_empty());
    }

    #[test]
    fn test_pan_sets_pending_for_renderer() {
        let mut scene = Scene::new();
        let map = scene.create_map(&options());
        assert_eq!(scene.take_pending_pan(map), Some(Position::new(0.0, 0.0)));
        assert_eq!(scene.take_pending_pan(map), None);
        scene.pan_to(map, Position::new(-33.87, 151.21));
        assert_eq!(scene.map_center(map), Some(Position::new(-33.87, 151.21)));
        assert_eq!(scene.take_pending_pan(map), Some(Position::new(-33.87, 151.21)));
    }

    #[test]
    fn test_dismiss_popup_emits_event() {
        let mut scene = Scene::with_journal();
        let map = scene.create_map(&options());
        let a = marker(&mut scene, 1.0);
        let popup = scene.open_popup(map, a, Position::new(1.0, 0.0), "hi".into());
        scene.dismiss_popup(popup);
        scene.dismiss_popup(popup);
        assert_eq!(scene.open_popup_count(), 0);
        assert_eq!(scene.drain_events(), vec![SdkEvent::PopupClosed(popup)]);
        assert_eq!(scene.journal().last(), Some(&SceneOp::ClosePopup(popup)));
    }

    #[test]
    fn test_dock_control_replaces_position() {
        let mut scene = Scene::new();
        let map = scene.create_map(&options());
        scene.dock_control(map, Control::SearchBox, ControlPosition::TopLeft);
        scene.dock_control(map, Control::SearchBox, ControlPosition::TopRight);
        let controls = &scene.map(map).unwrap().controls;
        assert_eq!(controls, &vec![(Control::SearchBox, ControlPosition::TopRight)]);
    }
}
