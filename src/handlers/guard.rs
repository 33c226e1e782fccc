use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::classify::{client_identifier, csrf_token, session_id};
use crate::guard::{GuardDecision, GuardRequest};
use crate::metrics::GUARD_DECISIONS;
use crate::models::RejectionBody;
use crate::state::AppState;

const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

// Runs the guard before every protected route
pub async fn guard_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (class, decision) = {
        let headers = request.headers();
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let identifier = client_identifier(headers, peer, &state.trusted_proxies);
        let class = state.routes.classify(request.uri().path());

        let decision = state.guard.evaluate(&GuardRequest {
            identifier: identifier.as_deref(),
            operation_class: class,
            csrf_token: csrf_token(headers),
            session_id: session_id(headers),
            mutating: !request.method().is_safe(),
        });
        (class.to_string(), decision)
    };

    match decision {
        GuardDecision::Allowed {
            remaining,
            reset_at,
        } => {
            GUARD_DECISIONS.with_label_values(&[class.as_str(), "allowed"]).inc();
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            headers.insert(RESET_HEADER, HeaderValue::from(reset_at));
            response
        }
        GuardDecision::RateLimited { retry_after_ms } => {
            GUARD_DECISIONS
                .with_label_values(&[class.as_str(), "rate_limited"])
                .inc();
            tracing::info!(%class, retry_after_ms, "request rate limited");

            let retry_after_secs = retry_after_ms.div_ceil(1_000);
            let body = RejectionBody {
                error: "rate_limited".to_string(),
                retry_after_ms: Some(retry_after_ms),
            };
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            response
        }
        GuardDecision::CsrfRejected => {
            GUARD_DECISIONS
                .with_label_values(&[class.as_str(), "csrf_rejected"])
                .inc();
            tracing::info!(%class, "request rejected: csrf");

            let body = RejectionBody {
                error: "csrf_rejected".to_string(),
                retry_after_ms: None,
            };
            (StatusCode::FORBIDDEN, Json(body)).into_response()
        }
    }
}
