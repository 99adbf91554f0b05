// Map panel: walkers tiles plus a plugin that paints the scene's pins and popup
use super::cluster::group_points;
use crate::city::Position;
use crate::scene::Scene;
use crate::sdk::{Color, MapId, MarkerId, PinElement, PopupId};
use eframe::egui;
use std::cell::Cell;
use std::rc::Rc;
use walkers::{HttpTiles, Map, MapMemory, Plugin, Projector};

/// What the user clicked on during the last frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapHit {
    Marker(MarkerId),
    /// A cluster bubble; holds the mean position of its members.
    Cluster(Position),
    Popup(PopupId),
}

struct PinSprite {
    marker: MarkerId,
    at: Position,
    pin: PinElement,
    interactive: bool,
}

struct PopupSprite {
    id: PopupId,
    at: Position,
    text: String,
}

fn to_walkers(p: Position) -> walkers::Position {
    walkers::lat_lon(p.lat, p.lng)
}

fn to_color32(c: Color) -> egui::Color32 {
    egui::Color32::from_rgb(c.r, c.g, c.b)
}

/// Walkers state for the single session map.
pub struct MapView {
    memory: MapMemory,
    tiles: Option<HttpTiles>,
    cluster_radius: f32,
    zoom_applied: bool,
    hit: Rc<Cell<Option<MapHit>>>,
}

impl MapView {
    pub fn new(cluster_radius: f32) -> Self {
        Self {
            memory: MapMemory::default(),
            tiles: None,
            cluster_radius,
            zoom_applied: false,
            hit: Rc::new(Cell::new(None)),
        }
    }

    fn ensure_tiles(&mut self, ctx: &egui::Context) {
        if self.tiles.is_none() {
            self.tiles = Some(HttpTiles::new(walkers::sources::OpenStreetMap, ctx.clone()));
        }
    }

    /// Paints `map` from `scene` and feeds clicks back into it as input events.
    pub fn show(&mut self, ui: &mut egui::Ui, scene: &mut Scene, map: MapId) {
        self.ensure_tiles(ui.ctx());

        let Some(state) = scene.map(map) else {
            return;
        };
        let home = state.center;
        if !self.zoom_applied {
            let zoom = state.zoom;
            if self.memory.set_zoom(zoom).is_err() {
                tracing::debug!("initial zoom {zoom} out of range");
            }
            self.zoom_applied = true;
        }
        if let Some(pos) = scene.take_pending_pan(map) {
            self.memory.center_at(to_walkers(pos));
        }

        let layer = PinLayer::collect(scene, map, self.cluster_radius, Rc::clone(&self.hit));
        if let Some(tiles) = self.tiles.as_mut() {
            let widget = Map::new(Some(tiles), &mut self.memory, to_walkers(home)).with_plugin(layer);
            ui.add(widget);
        }

        let center = self.memory.detached().map(|p| Position::new(p.y(), p.x())).unwrap_or(home);
        scene.set_viewport(map, center, self.memory.zoom());

        match self.hit.take() {
            Some(MapHit::Marker(marker)) => scene.click_marker(marker),
            Some(MapHit::Popup(popup)) => scene.dismiss_popup(popup),
            Some(MapHit::Cluster(at)) => {
                self.memory.center_at(to_walkers(at));
                for _ in 0..2 {
                    if self.memory.zoom_in().is_err() {
                        break;
                    }
                }
            }
            None => {}
        }
    }
}

struct PinLayer {
    clustered: Vec<PinSprite>,
    loose: Vec<PinSprite>,
    popup: Option<PopupSprite>,
    cluster_radius: f32,
    hit: Rc<Cell<Option<MapHit>>>,
}

impl PinLayer {
    fn collect(scene: &Scene, map: MapId, cluster_radius: f32, hit: Rc<Cell<Option<MapHit>>>) -> Self {
        let sprite = |marker: MarkerId| {
            scene.marker(marker).map(|m| PinSprite {
                marker,
                at: m.position,
                pin: m.content.clone(),
                interactive: m.interactive,
            })
        };
        let mut clustered: Vec<PinSprite> = Vec::new();
        for (_, cluster) in scene.clusters_on(map) {
            clustered.extend(cluster.members.iter().filter_map(|m| sprite(*m)));
        }
        // Hash map order is arbitrary; keep bubbles stable between frames.
        clustered.sort_by_key(|s| s.marker);
        let mut loose: Vec<PinSprite> = scene.loose_markers(map).filter_map(|(id, _)| sprite(id)).collect();
        loose.sort_by_key(|s| s.marker);
        let popup = scene
            .popups()
            .find(|(_, p)| p.map == map)
            .map(|(id, p)| PopupSprite { id, at: p.position, text: p.content.clone() });
        Self { clustered, loose, popup, cluster_radius, hit }
    }
}

fn screen(projector: &Projector, at: Position) -> egui::Pos2 {
    let v = projector.project(to_walkers(at));
    egui::pos2(v.x, v.y)
}

/// Rounded label with a small tail pointing at `anchor`.
fn draw_pin(painter: &egui::Painter, anchor: egui::Pos2, pin: &PinElement) -> egui::Rect {
    let galley = painter.layout_no_wrap(
        pin.glyph.clone(),
        egui::FontId::proportional(12.0),
        to_color32(pin.glyph_color),
    );
    let size = galley.size() + egui::vec2(10.0, 6.0);
    let rect = egui::Rect::from_center_size(anchor - egui::vec2(0.0, size.y / 2.0 + 6.0), size);
    let background = to_color32(pin.background);
    let border = egui::Stroke::new(1.5, to_color32(pin.border_color));

    painter.add(egui::Shape::convex_polygon(
        vec![
            anchor,
            rect.center_bottom() + egui::vec2(-5.0, 0.0),
            rect.center_bottom() + egui::vec2(5.0, 0.0),
        ],
        background,
        border,
    ));
    painter.rect_filled(rect, 4.0, background);
    painter.rect_stroke(rect, 4.0, border, egui::StrokeKind::Outside);
    painter.galley(rect.min + egui::vec2(5.0, 3.0), galley, egui::Color32::WHITE);
    rect
}

fn draw_cluster(painter: &egui::Painter, center: egui::Pos2, count: usize) -> f32 {
    let radius = 14.0 + (count as f32).log10() * 6.0;
    painter.circle_filled(center, radius, egui::Color32::from_rgb(0xd9, 0x3b, 0x2b));
    painter.circle_stroke(center, radius, egui::Stroke::new(2.0, egui::Color32::WHITE));
    painter.text(
        center,
        egui::Align2::CENTER_CENTER,
        count.to_string(),
        egui::FontId::proportional(13.0),
        egui::Color32::WHITE,
    );
    radius
}

fn draw_popup(painter: &egui::Painter, anchor: egui::Pos2, text: &str) -> egui::Rect {
    let galley = painter.layout(
        text.to_string(),
        egui::FontId::proportional(13.0),
        egui::Color32::BLACK,
        260.0,
    );
    let size = galley.size() + egui::vec2(16.0, 12.0);
    let rect = egui::Rect::from_center_size(anchor - egui::vec2(0.0, size.y / 2.0 + 34.0), size);
    painter.rect_filled(rect, 6.0, egui::Color32::WHITE);
    painter.rect_stroke(rect, 6.0, egui::Stroke::new(1.0, egui::Color32::GRAY), egui::StrokeKind::Outside);
    painter.galley(rect.min + egui::vec2(8.0, 6.0), galley, egui::Color32::BLACK);
    painter.text(
        rect.right_top() + egui::vec2(-6.0, 4.0),
        egui::Align2::RIGHT_TOP,
        "\u{2715}",
        egui::FontId::proportional(11.0),
        egui::Color32::GRAY,
    );
    rect
}

impl Plugin for PinLayer {
    fn run(
        self: Box<Self>,
        ui: &mut egui::Ui,
        response: &egui::Response,
        projector: &Projector,
        _memory: &MapMemory,
    ) {
        let painter = ui.painter();
        let click = if response.clicked() { response.interact_pointer_pos() } else { None };
        let mut hit = None;

        let points: Vec<egui::Pos2> = self.clustered.iter().map(|s| screen(projector, s.at)).collect();
        for group in group_points(&points, self.cluster_radius) {
            if let [only] = group.members.as_slice() {
                let sprite = &self.clustered[*only];
                let rect = draw_pin(painter, group.center, &sprite.pin);
                let touched = click.is_some_and(|c| rect.contains(c) || c.distance(group.center) < 6.0);
                if sprite.interactive && touched {
                    hit = Some(MapHit::Marker(sprite.marker));
                }
                continue;
            }
            let radius = draw_cluster(painter, group.center, group.members.len());
            if click.is_some_and(|c| c.distance(group.center) <= radius) {
                let n = group.members.len() as f64;
                let (lat, lng) = group.members.iter().fold((0.0, 0.0), |(lat, lng), &i| {
                    let at = self.clustered[i].at;
                    (lat + at.lat, lng + at.lng)
                });
                hit = Some(MapHit::Cluster(Position::new(lat / n, lng / n)));
            }
        }

        // Loose markers (the user pin) are never grouped.
        for sprite in &self.loose {
            let anchor = screen(projector, sprite.at);
            let rect = draw_pin(painter, anchor, &sprite.pin);
            if sprite.interactive && click.is_some_and(|c| rect.contains(c)) {
                hit = Some(MapHit::Marker(sprite.marker));
            }
        }

        if let Some(popup) = &self.popup {
            let rect = draw_popup(painter, screen(projector, popup.at), &popup.text);
            if click.is_some_and(|c| rect.contains(c)) {
                hit = Some(MapHit::Popup(popup.id));
            }
        }

        if hit.is_some() {
            self.hit.set(hit);
        }
    }
}
