use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use gps_telemetry_ingest::config::Config;
use gps_telemetry_ingest::listener::Listener;
use gps_telemetry_ingest::protocol::tfms90::AliasMap;
use gps_telemetry_ingest::registry::PgDeviceRegistry;
use gps_telemetry_ingest::sink::PgTelemetrySink;

/// GPS/telematics telemetry ingestion server.
///
/// Binds the configured TCP port, accepts Teltonika and TFMS90 connections
/// behind protocol sniffing, and persists decoded records to Postgres.
#[tokio::main]
async fn main() -> ExitCode {
    init_logger();

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            error!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let pool = match PgPoolOptions::new()
        .max_connections(config.database_pool_size)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(err) => {
            error!("failed to connect to database: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = sqlx::migrate!("./migrations").run(&pool).await {
        error!("failed to run migrations: {err}");
        return ExitCode::FAILURE;
    }

    let registry = Arc::new(PgDeviceRegistry::new(pool.clone()));
    let sink = Arc::new(PgTelemetrySink::new(pool));
    let alias_map = Arc::new(AliasMap::new());

    let listener = Listener::new(config.clone(), registry, sink, alias_map);

    let shutdown = CancellationToken::new();
    let shutdown_for_signals = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        shutdown_for_signals.cancel();
    });

    info!("starting gps-telemetry-ingest");
    if let Err(err) = listener.run(shutdown).await {
        error!("listener exited with error: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initializes `env_logger`, honoring `RUST_LOG` first and falling back to
/// `LOG_LEVEL` (defaulting to `info`) so the filter is known before
/// `Config::from_env` can log anything about itself.
fn init_logger() {
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::new().parse_filters(&filter).init();
}

/// Resolves once on Ctrl+C or SIGTERM, whichever comes first.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
