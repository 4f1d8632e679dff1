//! REST endpoint handlers organized by resource.

pub mod settings;
pub mod state;
pub mod system;

use axum::Router;
use axum::http::HeaderMap;
use axum::routing::{get, post};

use crate::app_state::AppState;
use crate::domain::{CloseReason, Transport};
use crate::error::GatewayError;

/// Header carrying the access key for authenticated REST endpoints.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authenticates one REST request as a one-shot connection.
///
/// The connection exists only for the duration of the check; it is
/// removed again before the handler body runs.
///
/// # Errors
///
/// [`GatewayError::Unauthorized`] when the header is missing or the key
/// does not match.
pub async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), GatewayError> {
    let key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(GatewayError::Unauthorized)?;

    let handle = state.service.connect(Transport::Rest).await;
    let result = state.service.authenticate(handle.id, key).await;
    state
        .service
        .disconnect(handle.id, CloseReason::Normal)
        .await;
    result.map_err(|_| GatewayError::Unauthorized)
}

/// Composes all resource routes mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/state", get(state::state_handler))
        .route("/settings", post(settings::update_settings_handler))
}
