//! HTTP surface over the pairing engine.
//!
//! Authentication happens upstream; the caller identity arrives in the
//! `X-Actor` header.

use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::clock::Clock;
use crate::engine::PairingEngine;
use crate::storage::SqliteStore;
use crate::{Error, Result};

pub mod routes;

/// Header carrying the authenticated caller identity
pub const ACTOR_HEADER: &str = "x-actor";

/// Server state
pub struct AppState {
    pub store: SqliteStore,
    pub clock: Arc<dyn Clock>,
    /// Recorded as `assigned_by` when a request has no actor header
    pub default_actor: String,
}

impl AppState {
    pub fn new(store: SqliteStore, clock: Arc<dyn Clock>, default_actor: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            default_actor: default_actor.into(),
        }
    }

    pub fn engine(&self) -> PairingEngine<'_> {
        PairingEngine::new(&self.store, self.clock.as_ref())
    }

    /// Run engine work on the blocking pool.
    ///
    /// Store calls take a mutex and may wait out SQLite's busy timeout, so
    /// they never run on an async worker.
    pub async fn run<T, F>(self: Arc<Self>, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&PairingEngine<'_>) -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || work(&self.engine()))
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/asset-tags", get(routes::list_tags))
        .route("/pairs/batch", post(routes::assign_batch))
        .route("/pairs/search", get(routes::search_pairs))
        .route("/pairs/replace", put(routes::replace_pair))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);

    tracing::info!("Starting server on {}", addr);
    println!("🌍 Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
