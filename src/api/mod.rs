//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` and
//! `/discovery` live at the root.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    paths(
        handlers::state::state_handler,
        handlers::settings::update_settings_handler,
        handlers::system::health_handler,
        handlers::system::discovery_handler,
    ),
    components(schemas(
        dto::SettingsUpdateRequest,
        dto::SettingsAccepted,
        dto::DiscoveryResponse,
        dto::HealthResponse,
    )),
    tags(
        (name = "State", description = "Last-known telemetry values"),
        (name = "Settings", description = "Hot reconfiguration"),
        (name = "System", description = "Health and discovery"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}
