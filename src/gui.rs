//! Desktop front end: one window, one map, a docked search box.

mod app;
mod cluster;
mod map_view;

use crate::config::AppConfig;
use crate::scene::Scene;
use crate::session::Session;
use eframe::egui;

pub use app::CityMapApp;

pub fn run(config: &AppConfig, session: Session<Scene>) -> Result<(), eframe::Error> {
    // Physical pixels equal logical points here; font_scale is applied on
    // the first frame.
    let width = config.gui.width.unwrap_or(1280) as f32;
    let height = config.gui.height.unwrap_or(800) as f32;
    tracing::debug!("window {width}x{height}");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([width, height])
            .with_title(format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))),
        ..Default::default()
    };

    let app = CityMapApp::new(config, session);
    eframe::run_native(env!("CARGO_PKG_NAME"), options, Box::new(move |_cc| Ok(Box::new(app))))
}
