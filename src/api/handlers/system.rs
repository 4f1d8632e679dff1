//! System endpoints: health check and discovery mirror.

use axum::Json;
use axum::extract::State;
use axum::routing::get;
use axum::{Router, response::IntoResponse};
use chrono::Utc;

use crate::api::dto::{DiscoveryResponse, HealthResponse};
use crate::app_state::AppState;

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health, version, connection count, and the dropped-event counter.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: state.service.registry().len().await,
        dropped_events: state.service.event_bus().dropped_events(),
    })
}

/// `GET /discovery` — Unauthenticated mirror of the advertised record.
///
/// Lets clients that found the gateway by other means read the same
/// `{instanceId, apiPort, wsPort}` record the mDNS advertisement
/// carries. No secret is included.
#[utoipa::path(
    get,
    path = "/discovery",
    tag = "System",
    summary = "Discovery record",
    responses(
        (status = 200, description = "Advertised service record", body = DiscoveryResponse),
    )
)]
pub async fn discovery_handler(State(state): State<AppState>) -> impl IntoResponse {
    // Prefer the actually-bound ports (relevant with OS-assigned port 0).
    let (api_port, ws_port) = match state.lifecycle.bound_addrs().await {
        Some((api, ws)) => (api.port(), ws.port()),
        None => {
            let snapshot = state.settings.borrow().clone();
            (snapshot.api_port, snapshot.ws_port)
        }
    };
    Json(DiscoveryResponse {
        instance_id: state.instance_id.clone(),
        api_port,
        ws_port,
    })
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/discovery", get(discovery_handler))
}
