//! Settings update endpoint.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use super::authorize;
use crate::api::dto::{SettingsAccepted, SettingsUpdateRequest};
use crate::app_state::AppState;
use crate::config::SettingsSnapshot;
use crate::error::GatewayError;

/// `POST /api/v1/settings` — Apply a partial settings update.
///
/// Authenticated via the `x-api-key` header (with the *current* key).
/// The merged snapshot is handed to the lifecycle controller in a
/// background task: a port change rebinds the listeners and would
/// otherwise deadlock waiting on this very request to finish, so the
/// endpoint acknowledges with `202 Accepted` first.
///
/// # Errors
///
/// [`GatewayError::Unauthorized`] on a missing or wrong access key.
#[utoipa::path(
    post,
    path = "/api/v1/settings",
    tag = "Settings",
    summary = "Apply a settings change",
    request_body = SettingsUpdateRequest,
    responses(
        (status = 202, description = "Update accepted and being applied", body = SettingsAccepted),
        (status = 401, description = "Missing or wrong access key"),
    )
)]
pub async fn update_settings_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SettingsUpdateRequest>,
) -> Result<(StatusCode, Json<SettingsAccepted>), GatewayError> {
    authorize(&state, &headers).await?;

    let next = merge(&state.settings.borrow().clone(), &request);
    let lifecycle = state.lifecycle.clone();
    tokio::spawn(async move {
        if let Err(err) = lifecycle.apply_settings(next).await {
            tracing::error!(%err, "failed to apply settings update");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(SettingsAccepted {
            status: "accepted".to_string(),
        }),
    ))
}

fn merge(current: &SettingsSnapshot, request: &SettingsUpdateRequest) -> SettingsSnapshot {
    let mut next = current.clone();
    if let Some(port) = request.api_port {
        next.api_port = port;
    }
    if let Some(port) = request.ws_port {
        next.ws_port = port;
    }
    if request.clear_api_key {
        next.api_key = None;
    } else if let Some(key) = &request.api_key {
        next.api_key = Some(key.clone());
    }
    if let Some(flag) = request.launch_on_startup {
        next.launch_on_startup = flag;
    }
    next
}
