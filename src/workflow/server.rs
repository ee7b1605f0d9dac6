use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;

use super::api::{self, AppState, SharedState};
use super::db::{DbHandle, ReviewDb};
use super::notify::BroadcastNotifier;
use super::orchestrator::ReviewService;
use super::ws;

/// Configuration for the review server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub channel_capacity: usize,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for ServerConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.database.path.clone(),
            channel_capacity: config.notifications.channel_capacity,
            dev_mode: config.server.dev_mode,
        }
    }
}

impl ServerConfig {
    /// Dev mode listens on every interface.
    pub fn bind_addr(&self) -> String {
        let host = if self.dev_mode { "0.0.0.0" } else { self.host.as_str() };
        format!("{}:{}", host, self.port)
    }
}

/// Open the database and wire the service to a broadcast notifier.
/// Must run inside a tokio runtime.
pub fn build_state(db: ReviewDb, channel_capacity: usize) -> SharedState {
    let (ws_tx, _rx) = broadcast::channel::<String>(channel_capacity.max(1));
    let notifier = Arc::new(BroadcastNotifier::new(ws_tx.clone()));
    Arc::new(AppState {
        service: ReviewService::new(DbHandle::new(db), notifier),
        ws_tx,
    })
}

/// Build the full application router: API routes plus the event stream.
pub fn build_router(state: SharedState, dev_mode: bool) -> Router {
    let ws_tx = state.ws_tx.clone();

    let mut app = api::api_router()
        .route(
            "/ws",
            get(move |ws_upgrade| ws::ws_handler(ws_upgrade, ws_tx)),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Open (or create) the database file, creating its parent directory.
pub fn open_database(path: &std::path::Path) -> Result<ReviewDb> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    ReviewDb::new(path).context("Failed to initialize review database")
}

/// Start the review server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    start_server_with_shutdown(config, shutdown_signal()).await
}

pub async fn start_server_with_shutdown(
    config: ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let db = open_database(&config.db_path)?;
    let state = build_state(db, config.channel_capacity);
    let app = build_router(state, config.dev_mode);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, db = %config.db_path.display(), "venue review server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
