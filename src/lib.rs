#[cfg(feature = "egui_ui")]
use eframe::egui;

pub mod config;
pub mod connection;

pub mod driver_mssql;
pub mod export;
pub mod fanout;
pub mod models;
pub mod result_text;
pub mod script;
pub mod session;

#[cfg(feature = "egui_ui")]
pub mod window_egui;

/// Reusable entrypoint so other launchers can run the UI.
#[cfg(feature = "egui_ui")]
pub fn run() -> Result<(), eframe::Error> {
    dotenv::dotenv().ok();
    let _ = env_logger::Builder::from_default_env()
        .filter_module("multisql", log::LevelFilter::Debug)
        .is_test(false)
        .try_init();
    config::ensure_data_dir();
    log::info!(
        "Application starting with data directory: {}",
        config::get_data_dir().display()
    );
    let mut options = eframe::NativeOptions::default();
    options.viewport.inner_size = Some(egui::vec2(1280.0, 840.0));
    options.viewport.min_inner_size = Some(egui::vec2(800.0, 600.0));
    eframe::run_native(
        "MultiSql",
        options,
        Box::new(|_cc| Ok(Box::new(window_egui::MultiSql::new()))),
    )
}
