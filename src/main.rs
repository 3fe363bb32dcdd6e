// GUI-subsystem binary on Windows release builds: no console window.
#![cfg_attr(all(target_os = "windows", not(debug_assertions)), windows_subsystem = "windows")]

use clap::Parser;
use eframe::egui;

use normalmaker::app::NormalMakerApp;
use normalmaker::cli::CliArgs;
use normalmaker::logger;

fn main() -> Result<(), eframe::Error> {
    logger::init();

    // -- CLI / headless mode ---------------------------------------------
    if CliArgs::is_cli_mode() {
        let args = CliArgs::parse();
        let code = normalmaker::cli::run(args);
        std::process::exit(if code == std::process::ExitCode::SUCCESS {
            0
        } else {
            1
        });
    }

    // -- GUI mode -----------------------------------------------------
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_min_inner_size([640.0, 400.0])
            .with_title("NormalMaker"),
        ..Default::default()
    };

    eframe::run_native(
        "NormalMaker",
        options,
        Box::new(|cc| Box::new(NormalMakerApp::new(cc))),
    )
}
