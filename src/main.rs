use smokefree_tracker::{load_state, logging::init_tracing, open_store, router, AppState, Config};
use std::net::SocketAddr;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    let remote_log = init_tracing(config.remote_log.clone())?;
    for warning in &config.warnings {
        warn!("{warning}");
    }

    let store = open_store(config.store, &config.data_path);
    let data = load_state(store.as_ref()).await;
    info!(
        durable = store.is_durable(),
        path = %config.data_path.display(),
        first_run = data.first_run,
        "state ready"
    );

    let app = router(AppState::new(store, data));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(logger) = remote_log {
        logger.flush("shutdown").await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
