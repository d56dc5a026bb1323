//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::relay::{ConnectionStats, RelayError};
use crate::util::time::uptime_secs;
use crate::vehicle::VehicleState;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/state", get(state_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state))
        .with_state(state)
}

/// CORS: any origin by default, or the comma-separated CLIENT_ORIGIN list
fn cors_layer(state: &AppState) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if state.config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();

    cors.allow_origin(allowed_origins).allow_credentials(true)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    live_connections: usize,
    connections: ConnectionStats,
}

async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let snapshot = state.relay.snapshot().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        live_connections: snapshot.live_connections,
        connections: snapshot.connections,
    }))
}

// ============================================================================
// Vehicle state endpoint
// ============================================================================

async fn state_handler(State(state): State<AppState>) -> Result<Json<VehicleState>, AppError> {
    let snapshot = state.relay.snapshot().await?;
    Ok(Json(snapshot.state))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<RelayError> for AppError {
    fn from(e: RelayError) -> Self {
        AppError::Unavailable(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
