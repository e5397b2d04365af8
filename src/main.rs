use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orchid_monitor::{
    api::{self, AppState},
    clock::SystemClock,
    config::{Config, StoreBackend},
    monitor::AlertMonitor,
    store::{DocumentStore, MemoryDocumentStore, MemoryRealtimeStore, PgDocumentStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent; env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let documents: Arc<dyn DocumentStore> = match &config.store_backend {
        StoreBackend::Memory => Arc::new(MemoryDocumentStore::new()),
        StoreBackend::Postgres { database_url } => Arc::new(PgDocumentStore::connect(database_url).await?),
    };
    info!(backend = documents.backend_tag(), "Document store ready");

    let state = AppState::new(
        documents,
        Arc::new(MemoryRealtimeStore::new()),
        Arc::new(SystemClock),
        Duration::from_secs(config.refresh_interval_secs),
    );

    // One alert monitor per watched owner
    for owner in &config.watch_owners {
        let monitor = AlertMonitor::new(owner.clone(), state.dashboard.clone(), state.alerts.clone());
        tokio::spawn(monitor.run());
    }

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
