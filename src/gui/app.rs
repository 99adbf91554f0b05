use super::map_view::MapView;
use crate::config::AppConfig;
use crate::scene::Scene;
use crate::sdk::{Control, ControlPosition};
use crate::session::{Session, SessionStatus};
use eframe::egui;
use std::time::{Duration, Instant};

const APP_TITLE: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

pub struct CityMapApp {
    session: Session<Scene>,
    view: MapView,
    search_text: String,
    placeholder: String,
    font_scale: f32,
    scale_applied: bool,
}

impl CityMapApp {
    pub fn new(config: &AppConfig, session: Session<Scene>) -> Self {
        Self {
            session,
            view: MapView::new(config.map.cluster_radius),
            search_text: String::new(),
            placeholder: config.search.placeholder.clone(),
            font_scale: config.gui.font_scale.unwrap_or(1.0),
            scale_applied: false,
        }
    }

    fn title(&mut self) -> String {
        match self.session.status() {
            SessionStatus::Ready { shown, total, feed_error: None } => {
                format!("{APP_TITLE} | {shown} of {total} cities")
            }
            SessionStatus::Ready { feed_error: Some(_), .. } => format!("{APP_TITLE} | no city list"),
            SessionStatus::Loading { .. } => format!("{APP_TITLE} | Loading..."),
            SessionStatus::MapUnavailable(_) => format!("{APP_TITLE} | map unavailable"),
        }
    }

    fn show_status_bar(&mut self, ctx: &egui::Context) {
        let mut lines: Vec<egui::RichText> = Vec::new();
        match self.session.status() {
            SessionStatus::Loading { cities: true, .. } => lines.push("Loading cities...".into()),
            SessionStatus::Ready { feed_error: Some(error), .. } => lines.push(
                egui::RichText::new(format!("City list unavailable: {error}"))
                    .color(egui::Color32::LIGHT_RED)
                    .strong(),
            ),
            SessionStatus::Ready { shown, total, feed_error: None } => {
                lines.push(format!("{shown} of {total} cities").into())
            }
            _ => {}
        }
        if let Some(error) = self.session.geolocation_failure() {
            lines.push(
                egui::RichText::new(format!("Position unknown: {error}")).color(egui::Color32::GRAY),
            );
        }

        if lines.is_empty() {
            return;
        }
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                for (i, line) in lines.into_iter().enumerate() {
                    if i > 0 {
                        ui.separator();
                    }
                    ui.label(line);
                }
            });
        });
    }

    fn show_map(&mut self, ui: &mut egui::Ui) {
        match self.session.status() {
            SessionStatus::MapUnavailable(error) => {
                let text = format!("Map unavailable\n\n{error}");
                ui.centered_and_justified(|ui| {
                    ui.label(egui::RichText::new(text).size(18.0).color(egui::Color32::LIGHT_RED));
                });
                return;
            }
            SessionStatus::Loading { library: true, .. } => {
                ui.centered_and_justified(|ui| {
                    ui.label(egui::RichText::new("Loading map...").size(18.0));
                });
                return;
            }
            _ => {}
        }

        let Some(map) = self.session.map() else {
            return;
        };
        let Some(scene) = self.session.sdk() else {
            return;
        };
        self.view.show(ui, scene, map.id());

        let docked = scene
            .map(map.id())
            .and_then(|state| state.controls.iter().find(|(c, _)| *c == Control::SearchBox))
            .map(|(_, position)| *position);
        if let Some(position) = docked {
            self.show_search_box(ui.ctx(), position);
        }
    }

    fn show_search_box(&mut self, ctx: &egui::Context, position: ControlPosition) {
        let (align, offset) = match position {
            ControlPosition::TopLeft => (egui::Align2::LEFT_TOP, egui::vec2(10.0, 10.0)),
            ControlPosition::TopRight => (egui::Align2::RIGHT_TOP, egui::vec2(-10.0, 10.0)),
            ControlPosition::BottomLeft => (egui::Align2::LEFT_BOTTOM, egui::vec2(10.0, -40.0)),
            ControlPosition::BottomRight => (egui::Align2::RIGHT_BOTTOM, egui::vec2(-10.0, -40.0)),
        };

        let mut submitted = false;
        let mut changed = false;
        egui::Area::new(egui::Id::new("city_search")).anchor(align, offset).show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.search_text)
                        .hint_text(self.placeholder.as_str())
                        .desired_width(220.0),
                );
                changed = response.changed();
                submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if submitted {
                    response.request_focus();
                }
            });
        });

        if changed {
            self.session.on_search_input(&self.search_text, Instant::now());
        }
        if submitted {
            // Unknown or ambiguous names leave the map where it is.
            let outcome = self.session.on_search_submit(&self.search_text);
            tracing::debug!("submit {:?}: {outcome:?}", self.search_text);
        }
    }
}

impl eframe::App for CityMapApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.scale_applied {
            ctx.set_pixels_per_point(ctx.pixels_per_point() * self.font_scale);
            self.scale_applied = true;
        }

        if self.session.pump(Instant::now()) {
            ctx.request_repaint();
        }
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(self.title()));

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.session.close_popup();
        }

        self.show_status_bar(ctx);
        egui::CentralPanel::default().frame(egui::Frame::NONE).show(ctx, |ui| self.show_map(ui));

        // Keep polling background work even when the user is idle.
        if !self.session.is_settled() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }

    // Required since eframe 0.34; all drawing happens in `update`, which
    // eframe still calls before `ui`.
    fn ui(&mut self, _ui: &mut egui::Ui, _frame: &mut eframe::Frame) {}
}
