use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::ResetResponse;
use crate::state::AppState;
use crate::token::secrets_match;

const ADMIN_KEY_HEADER: &str = "x-admin-key";

// Manual unblock: drop the counter for one identifier in one class
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Path((class, identifier)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<ResetResponse>, AppError> {
    if !admin_authorized(&headers, state.admin_key.as_deref()) {
        return Err(AppError::Forbidden);
    }

    let cleared = state.guard.reset(&class, Some(&identifier));
    tracing::info!(%class, %identifier, cleared, "rate limit reset by admin");

    Ok(Json(ResetResponse {
        class,
        identifier,
        cleared,
    }))
}

fn admin_authorized(headers: &HeaderMap, admin_key: Option<&str>) -> bool {
    let Some(expected) = admin_key else {
        return false;
    };
    headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|given| secrets_match(given, expected))
}
