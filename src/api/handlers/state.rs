//! Current-state endpoint: last-known values from the event bus.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;

use super::authorize;
use crate::api::dto::StateQuery;
use crate::app_state::AppState;
use crate::error::GatewayError;

/// `GET /api/v1/state?events=a,b` — Last-known values per event name.
///
/// Authenticated via the `x-api-key` header. Returns the cached
/// most-recent payload for each requested name (every cached name when
/// `events` is omitted); names never published are simply absent.
///
/// # Errors
///
/// [`GatewayError::Unauthorized`] on a missing or wrong access key.
#[utoipa::path(
    get,
    path = "/api/v1/state",
    tag = "State",
    summary = "Read last-known telemetry values",
    params(StateQuery),
    responses(
        (status = 200, description = "Map of event name to last payload"),
        (status = 401, description = "Missing or wrong access key"),
    )
)]
pub async fn state_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StateQuery>,
) -> Result<Json<HashMap<String, serde_json::Value>>, GatewayError> {
    authorize(&state, &headers).await?;

    let names: Option<Vec<String>> = query.events.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    });
    let values = state
        .service
        .event_bus()
        .last_values(names.as_deref())
        .await;
    Ok(Json(values))
}
