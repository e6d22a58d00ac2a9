mod app;
mod config;
mod error;
mod images;
mod ledger;
mod quiz;
mod ui;

use app::FlagQuizApp;
use eframe::egui;
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::{self, File};

fn init_logging() {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    // Debug-level log file next to other per-user app data
    if let Some(dir) = dirs::data_local_dir().map(|dir| dir.join("flag_quiz")) {
        match fs::create_dir_all(&dir).and_then(|_| File::create(dir.join("flag_quiz.log"))) {
            Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Debug, Config::default(), file)),
            Err(e) => eprintln!("Log file disabled: {}", e),
        }
    }

    if let Err(e) = CombinedLogger::init(loggers) {
        eprintln!("Failed to initialise logging: {}", e);
    }
}

fn main() -> Result<(), eframe::Error> {
    init_logging();

    let options = eframe::NativeOptions {
        initial_window_size: Some(egui::vec2(525.0, 525.0)),
        ..Default::default()
    };

    eframe::run_native(
        "Flag Guesser",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Box::new(FlagQuizApp::new(cc))
        }),
    )
}
