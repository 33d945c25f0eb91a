use inventory::app;
use inventory::config::{Config, DEFAULT_LOG_FILTER};
use std::env;

/// Main entry point for the inventory web application
///
/// Usage: `inventory [DATA_DIR] [BIND_ADDR]`. Log verbosity follows
/// `RUST_LOG`, defaulting to `info`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER))
        .format_timestamp_secs()
        .init();

    let config = Config::from_args(env::args().skip(1))?;
    app::run(config).await
}
