//! API server entry point.

use std::time::Duration;

use api::config::{Config, LogFormat};
use checkout::ReservationReaper;
use inventory::{InMemoryInventoryLedger, InventoryLedger, PostgresInventoryLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{InMemoryOrderLedger, OrderLedger, PostgresOrderLedger};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve<I, L>(
    config: Config,
    metrics_handle: PrometheusHandle,
    inventory: I,
    orders: L,
) -> Result<(), BoxError>
where
    I: InventoryLedger + Clone + 'static,
    L: OrderLedger + Clone + 'static,
{
    let (state, notification_worker) =
        api::create_default_state(inventory.clone(), orders.clone(), &config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = ReservationReaper::new(inventory, orders).spawn(
        Duration::from_secs(config.reaper_interval_secs),
        shutdown_rx,
    );

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Router and state are gone; the worker drains what is queued and exits.
    let _ = shutdown_tx.send(true);
    if let Err(e) = reaper.await {
        tracing::warn!(error = %e, "reservation reaper ended abnormally");
    }
    match tokio::time::timeout(Duration::from_secs(5), notification_worker).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "notification worker ended abnormally"),
        Err(_) => tracing::warn!("notification worker did not drain in time"),
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Pick the ledgers and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(&url).await?;
            let inventory = PostgresInventoryLedger::new(pool.clone());
            inventory.run_migrations().await?;
            tracing::info!("using PostgreSQL ledgers");
            serve(config, metrics_handle, inventory, PostgresOrderLedger::new(pool)).await
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory ledgers");
            serve(
                config,
                metrics_handle,
                InMemoryInventoryLedger::new(),
                InMemoryOrderLedger::new(),
            )
            .await
        }
    }
}
