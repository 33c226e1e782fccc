use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::{Request, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;

use crate::error::AppError;
use crate::metrics::UPSTREAM_LATENCY;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// Forward an admitted request to the upstream and relay its answer
pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> Result<Response, AppError> {
    let upstream = state.upstream.as_deref().ok_or(AppError::NoUpstream)?;

    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", upstream.trim_end_matches('/'), path_and_query);

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::MalformedPayload)?;

    let mut headers = parts.headers;
    for hop in [
        header::HOST,
        header::CONNECTION,
        header::CONTENT_LENGTH,
        header::TRANSFER_ENCODING,
    ] {
        headers.remove(hop);
    }

    let start_time = Instant::now();
    tracing::debug!(method = %parts.method, %url, "forwarding request");

    let res = state
        .client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = res.status();
    let content_type = res.headers().get(header::CONTENT_TYPE).cloned();
    let bytes = res.bytes().await?;

    UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let mut response = (status, bytes).into_response();
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}
