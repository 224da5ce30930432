//! HTTP API for the UDP ingest gateway.
//!
//! - `POST /api/ingest/sessions` - create a new ingest session
//! - `GET /api/ingest/sessions/:name` - get session status
//! - `DELETE /api/ingest/sessions/:name` - kill a session
//! - `GET /health` - liveness probe
//! - `GET /metrics` - gateway counters

pub mod sessions;

use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::metrics::global_metrics;
use crate::session::SessionManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Session manager
    pub session_manager: Arc<SessionManager>,
    /// Service configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(session_manager: Arc<SessionManager>, config: Arc<Config>) -> Self {
        Self {
            session_manager,
            config,
        }
    }
}

/// Build the HTTP API router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Session endpoints
        .route("/api/ingest/sessions", post(sessions::create_session))
        .route("/api/ingest/sessions", get(sessions::list_sessions))
        .route("/api/ingest/sessions/:name", get(sessions::get_session))
        .route("/api/ingest/sessions/:name", delete(sessions::delete_session))
        // Health and metrics
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Gateway counters snapshot
async fn metrics_handler() -> Json<crate::metrics::MetricsSnapshot> {
    Json(global_metrics().snapshot())
}
