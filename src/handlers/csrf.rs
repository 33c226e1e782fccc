use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use std::sync::Arc;

use crate::classify::session_id;
use crate::error::{AppError, GuardError};
use crate::metrics::{TOKENS_ISSUED, TOKEN_ENTRIES};
use crate::models::TokenResponse;
use crate::state::AppState;

// Issue (or replace) the CSRF token for the caller's session
pub async fn issue_token_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    let session = session_id(&headers).ok_or(GuardError::InvalidSession)?;
    let token = state.tokens.issue(session, state.token_lifetime_ms)?;

    TOKENS_ISSUED.inc();
    TOKEN_ENTRIES.set(state.tokens.len() as i64);

    Ok(Json(TokenResponse {
        csrf_token: token.into_string(),
        expires_in_ms: state.token_lifetime_ms,
    }))
}

pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let session = session_id(&headers).ok_or(GuardError::InvalidSession)?;
    if state.tokens.invalidate(session) {
        tracing::debug!("session token invalidated");
    }
    Ok(StatusCode::NO_CONTENT)
}
