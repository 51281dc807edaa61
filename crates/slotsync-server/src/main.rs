mod api;
mod dispatch;
mod middleware;
mod scheduler;
mod sync;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, AppState};
use crate::sync::InventorySyncer;
use crate::worker::FetchWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(slotsync_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = slotsync_db::PoolConfig::from_app_config(&config);
    let pool = slotsync_db::connect_pool(&config.database_url, pool_config).await?;
    slotsync_db::run_migrations(&pool).await?;

    let client = slotsync_provider::ProviderClient::new(
        &config.provider_base_url,
        &config.provider_api_key,
        config.provider_timeout_secs,
    )?;
    let fetcher = slotsync_provider::RateLimitedFetcher::new(
        client,
        InventorySyncer::new(pool.clone()),
        config.rate_limit_max_calls,
    );
    let _window_timer =
        fetcher.spawn_window_timer(Duration::from_secs(config.rate_limit_window_secs));

    let _scheduler = scheduler::build_scheduler(pool.clone()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = FetchWorker::new(pool.clone(), fetcher, &config, shutdown_rx);
    let worker_handle = tokio::spawn(worker.run());

    let app = build_app(AppState { pool });
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The listener is closed; tell the worker to stop claiming entries and
    // wait for its in-flight job to finish.
    shutdown_tx.send(true).ok();
    worker_handle.await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
