mod app;
mod chat;
mod config;
mod particles;
mod stats;
mod sweep;
mod transcript;

use anyhow::Result;
use eframe::egui;

use app::{HauntedTerminal, APP_TITLE};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(APP_TITLE)
            .with_inner_size([1180.0, 700.0])
            .with_min_inner_size([1100.0, 640.0]),
        ..Default::default()
    };

    eframe::run_native("KAISEL", native_options, Box::new(|cc| Box::new(HauntedTerminal::new(cc))))
        .map_err(|e| anyhow::anyhow!("eframe: {e}"))
}
