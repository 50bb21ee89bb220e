//! HTTP API for the ChatZ service.
//!
//! This module provides the REST API endpoints for:
//! - Health monitoring
//! - Document upload and listing
//! - The extract, embed, ready and query pipeline stages

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::service::ChatzService;

pub mod documents;
pub mod pipeline;
use documents::{get_document_handler, list_documents_handler, upload_handler};
use pipeline::{embed_handler, extract_handler, query_handler, ready_handler};

/// Room for multipart framing on top of the document itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state
pub struct AppState {
    pub service: Arc<ChatzService>,
    pub start_time: Instant,
}

/// Build the API router
pub fn router(service: Arc<ChatzService>, config: &Config) -> Router {
    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Let oversized uploads reach the handler so they get the usual error body
    let max_body_size =
        config.limits.max_document_size_bytes as usize + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/extract/{id}", get(extract_handler))
        .route("/embed/{id}", post(embed_handler))
        .route("/ready/{id}", post(ready_handler))
        .route("/query", post(query_handler))
        .route("/documents", get(list_documents_handler))
        .route("/documents/{id}", get(get_document_handler))
        .layer(cors)
        .layer(timeout_layer(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Requests running past `timeout` are answered with 408
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

// === Health ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
}
