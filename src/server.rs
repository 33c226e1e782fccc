use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;

use crate::handlers::{
    forward_handler, guard_middleware, health_handler, issue_token_handler, logout_handler,
    metrics_handler, reset_handler,
};
use crate::state::AppState;

// Everything except health and metrics sits behind the guard
pub fn build_router(state: Arc<AppState>) -> Router {
    let guarded = Router::new()
        .route("/api/csrf-token", get(issue_token_handler))
        .route("/api/session/logout", post(logout_handler))
        .route(
            "/admin/rate-limits/{class}/{identifier}",
            delete(reset_handler),
        )
        .fallback(forward_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(guarded)
        .with_state(state)
}
