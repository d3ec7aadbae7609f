//! HTTP server: shared state, routes and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use helixrun_core::ExecutionEngine;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::chat;

/// Shared application state accessible to all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ExecutionEngine>,
    /// Parent of every run's cancellation token; cancelled on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat::chat))
        .route("/agents", get(list_agents))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_agents(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "agents": state.engine.registry().list_agent_ids() }))
}

async fn healthz() -> &'static str {
    "ok"
}

/// Bind and serve until Ctrl-C. In-flight runs are cancelled on shutdown.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, agents = state.engine.registry().len(), "helixrund listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("ctrl-c handler unavailable; shutting down");
            }
            info!("shutdown requested");
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    helixrun_core::metrics::METRICS.flush();
    Ok(())
}
