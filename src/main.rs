//! `livefeed-server`: the LiveFeed notification server.
//!
//! `LIVEFEED_ENV` picks the config overlay (`config/{env}.toml`, default
//! `development`); `RUST_LOG` overrides the configured log level.

use std::process::ExitCode;

use tracing_subscriber::{EnvFilter, fmt};

use livefeed_core::config::{AppConfig, LoggingConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let env = std::env::var("LIVEFEED_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("livefeed-server: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging);
    tracing::info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        heartbeat_secs = config.realtime.heartbeat_interval_seconds,
        stale_secs = config.realtime.stale_timeout_seconds,
        "Starting livefeed-server"
    );

    match livefeed_api::run_server(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "livefeed-server exited with error");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.format == "json" {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        fmt().pretty().with_env_filter(filter).init();
    }
}
