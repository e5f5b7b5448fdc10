mod api;
mod app;
mod config;
mod error;
mod image_loader;
mod layout;
mod models;
mod probe;
mod runtime;
mod ui;

use app::PortfolioApp;
use config::Config;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("photoport=info".parse().unwrap()),
        )
        .init();

    let config = Config::load();
    let app = match PortfolioApp::new(config) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start");
            std::process::exit(1);
        }
    };
    std::process::exit(app.run());
}
