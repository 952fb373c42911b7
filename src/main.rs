use clap::Parser;
use std::process;

use form_intake::logging::init_logging;
use form_intake::{web, Cli, Store};

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = Cli::parse().into_config();

    if let Err(e) = init_logging(&config.log_level, config.log_format) {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(2);
    }

    if config.export_unprotected() {
        tracing::warn!("EXPORT_PASSWORD is not set, /export will be UNPROTECTED");
    }

    // The service cannot do anything without its table
    let store = Store::new(&config.database);
    if let Err(e) = store.initialize() {
        tracing::error!(error = %e, path = %store.path().display(), "Database bootstrap failed");
        process::exit(1);
    }

    if let Err(e) = web::start_server(store, config).await {
        tracing::error!(error = %e, "Server error");
        process::exit(1);
    }
}
