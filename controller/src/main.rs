use axum::{
    routing::{get, post},
    Router,
};
use skyshelf_daemon::{Daemon, DaemonClient};
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

mod auth;
mod cache;
mod config;
mod error;
mod hub;
mod prober;
mod remotes;
mod scheduler;
mod storage;
#[cfg(test)]
mod testing;

use cache::TelemetryCache;
use config::ControllerConfig;
use hub::BroadcastHub;
use scheduler::{RefreshScheduler, SchedulerSettings};

// -----------------------------------------------------------------------------
// Shared state
// -----------------------------------------------------------------------------

/// Process-wide state shared by every handler and the background refresh.
pub struct ControllerState {
    pub daemon: Arc<dyn Daemon>,
    pub cache: Arc<TelemetryCache>,
    pub hub: Arc<BroadcastHub>,
    pub scheduler: Arc<RefreshScheduler>,

    /// Accepted API tokens, token -> user name.
    pub api_tokens: HashMap<String, String>,
}

impl ControllerState {
    pub fn new(
        daemon: Arc<dyn Daemon>,
        settings: SchedulerSettings,
        keepalive: Duration,
        api_tokens: HashMap<String, String>,
    ) -> Self {
        let cache = Arc::new(TelemetryCache::new());
        let hub = Arc::new(BroadcastHub::new(keepalive));
        let scheduler = RefreshScheduler::new(daemon.clone(), cache.clone(), hub.clone(), settings);

        ControllerState {
            daemon,
            cache,
            hub,
            scheduler,
            api_tokens,
        }
    }
}

pub type SharedState = Arc<ControllerState>;

// -----------------------------------------------------------------------------
// Main entry
// -----------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ControllerConfig::from_env()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut client = DaemonClient::new(config.daemon_url.clone());
    if let Some((user, pass)) = &config.daemon_credentials {
        client = client.with_credentials(user.clone(), pass.clone());
    }
    info!("using storage daemon at {}", client.base_url());

    if config.api_tokens.is_empty() {
        warn!("SKYSHELF_API_TOKENS is empty; every API request will be rejected");
    }

    let state: SharedState = Arc::new(ControllerState::new(
        Arc::new(client),
        config.scheduler_settings(),
        config.keepalive,
        config.api_tokens.clone(),
    ));

    let app = build_router(state.clone(), config.static_dir.clone());

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("skyshelf controller listening on {}", config.listen_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    info!("controller stopped");

    Ok(())
}

fn build_router(state: SharedState, static_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/api/storage", get(storage::snapshot))
        .route("/api/storage/stream", get(storage::stream))
        .route("/api/storage/refresh", post(storage::refresh))
        .route("/api/remotes/:remote/health", get(remotes::health))
        .route("/api/remotes/:remote/reconnect", post(remotes::reconnect))
        .route("/api/remotes/:remote/entries", get(remotes::entries))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => {
            info!("serving web UI from {}", dir.display());
            api.fallback_service(ServeDir::new(dir))
        }
        None => api,
    };

    app.layer(TraceLayer::new_for_http())
}

/// Waits for Ctrl-C, then stops the refresh timer and ends every open stream
/// so graceful shutdown is not held up by long-lived connections.
async fn shutdown_signal(state: SharedState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");

    state.scheduler.shutdown();
    state.hub.disconnect_all();
}
