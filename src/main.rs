//! Bus tracker service

use std::sync::Arc;

use bus_tracker::{
    api::{self, AppState},
    config::AppConfig,
    errors::TrackerError,
    feed::FeedClient,
    poller::Poller,
    store::SnapshotStore,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), TrackerError> {
    #[cfg(feature = "dotenv")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration, preferring environment variables and config files
    let config = AppConfig::load()?;
    if let Err(e) = config.validate() {
        error!("{}", e);
        return Err(e);
    }

    let client = FeedClient::new(&config.feed)?;
    info!("Polling feed at {}", client.url());

    let store = Arc::new(SnapshotStore::new());
    let poller = Poller::new(client, Arc::clone(&store), config.feed.poll_interval)
        .with_max_backoff(config.feed.max_backoff());

    let state = AppState {
        store,
        stats: poller.stats(),
    };

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| TrackerError::BindError {
            address: config.server.bind.clone(),
            source: e,
        })?;

    let cancel = CancellationToken::new();
    let poller_handle = tokio::spawn(poller.run(cancel.clone()));

    // Setup signal handling for graceful shutdown
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received shutdown signal"),
                    Err(e) => error!("Failed to listen for shutdown signal: {}", e),
                }
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
    });

    // Returns once the token is cancelled and in-flight requests finished
    let result = api::serve(listener, state, cancel.clone()).await;
    if let Err(e) = &result {
        error!("API server failed: {}", e);
    }

    cancel.cancel();
    if let Err(e) = poller_handle.await {
        error!("Poller task failed: {}", e);
    }

    result
}
