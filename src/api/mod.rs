//! HTTP surface: router, shared state and request accounting.

pub mod error;
pub mod handlers;

use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::orchestration::RegionPipeline;
use crate::utils::Metrics;

/// Which optional backends were configured at startup
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Capabilities {
    pub ocr: bool,
    pub model1: bool,
    pub model2: bool,
    pub method1: bool,
    pub method2: bool,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: RegionPipeline,
    pub metrics: Metrics,
    pub capabilities: Capabilities,
    pub max_upload_bytes: usize,
}

async fn count_requests(
    State(metrics): State<Metrics>,
    matched: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(path) = matched {
        metrics.record_endpoint_request(path.as_str());
    }
    next.run(request).await
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.max_upload_bytes;
    let metrics = state.metrics.clone();

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/stats", get(handlers::stats))
        .route("/upload", post(handlers::upload))
        .route("/clear", post(handlers::clear))
        .route("/uploads/:filename", get(handlers::serve_upload))
        .route("/process/:filename", get(handlers::serve_artifact))
        .route("/process_region", post(handlers::process_region))
        .route("/scan", post(handlers::scan))
        .route("/clear_cache", post(handlers::clear_cache))
        .route_layer(middleware::from_fn_with_state(metrics, count_requests))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
}
