use std::sync::Arc;

use stonks_core::poll::Poller;
use stonks_core::QuoteMetrics;
use stonks_server::{
    api::app_router,
    build_source, build_state, build_store,
    config::Config,
    init_tracing,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    let metrics = Arc::new(QuoteMetrics::new());
    let store = build_store(&config, metrics.clone())?;
    let source = build_source(&config, metrics.clone())?;

    let cancel = CancellationToken::new();

    let poller = Poller::new(source, store.clone(), metrics.clone(), config.poller_config());
    let poll_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.poll(cancel).await })
    };

    tokio::spawn(shutdown_signal(cancel.clone()));

    let router = app_router(build_state(store.clone(), metrics), config.request_timeout);
    tracing::info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await;

    // Stop polling even when the server exits on its own.
    cancel.cancel();
    if let Err(e) = poll_task.await {
        tracing::error!("Poller task failed: {}", e);
    }
    store.close()?;
    tracing::info!("Shutdown complete");

    served?;
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {}
    }

    cancel.cancel();
}
