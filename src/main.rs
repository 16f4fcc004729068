//! Patch Canvas - a visual editor for dataflow patches
//!
//! Entry point for the application. The optional first argument is a patch
//! file to open.

use std::path::PathBuf;

use eframe::egui;
use patch_canvas::app::CanvasApp;
use patch_canvas::config::Config;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Config::load();
    let file = std::env::args_os().nth(1).map(PathBuf::from);
    let app = CanvasApp::new(config, file)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_title("Patch Canvas"),
        ..Default::default()
    };

    eframe::run_native(
        "Patch Canvas",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )?;
    Ok(())
}
