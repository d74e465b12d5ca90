//! Main application entry point (native).

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    use clap::Parser;

    env_logger::init();
    log::info!("Starting tabletop client");

    let config = tabletop_app::AppConfig::parse();
    match tabletop_app::App::new(config) {
        Ok(mut app) => {
            app.run();
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            eprintln!("tabletop: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}
