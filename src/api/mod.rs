//! REST API for serving occupancy snapshots
//!
//! This module defines the read-only HTTP surface: the occupancy report,
//! a health probe and the Prometheus metrics endpoint.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::scheduler::AcquisitionService;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Acquisition service backing all reads
    pub service: Arc<AcquisitionService>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create state around an acquisition service
    pub fn new(service: Arc<AcquisitionService>) -> Self {
        Self {
            service,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Occupancy endpoints
        .route("/api/occupancy", get(get_occupancy))
        // Health endpoints
        .route("/api/health", get(health_check))
        // Prometheus metrics
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

/// Create the router with optional middleware layers
pub fn build_router(state: AppState, enable_cors: bool, enable_request_logging: bool) -> Router {
    let mut router = create_router(state);

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    if enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router
}

/// Serve the router until the shutdown future resolves
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> crate::error::Result<()> {
    tracing::info!("Starting read API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("Read API server shutdown complete");
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Current occupancy report for all facilities
///
/// Acquires a fresh snapshot first when the cache is cold, so this endpoint
/// always answers with data.
async fn get_occupancy(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.service.snapshot_report().await;
    Json(ApiResponse::success(report))
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
    }))
}

/// Prometheus metrics in text exposition format
async fn get_metrics() -> axum::response::Response {
    match crate::metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================
