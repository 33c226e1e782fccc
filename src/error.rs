use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

// Setup-time and programming errors raised by the guard library.
// Rate limiting and CSRF failures are decisions, not errors.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("invalid policy: max_requests={max_requests}, window_ms={window_ms} (both must be positive)")]
    InvalidPolicy { max_requests: u32, window_ms: u64 },

    #[error("invalid session: session id must not be empty")]
    InvalidSession,

    #[error("token lifetime must be positive")]
    InvalidTokenLifetime,

    #[error("route rule `{prefix}` references undeclared class `{class}`")]
    UnknownClass { prefix: String, class: String },

    #[error("class `{0}` is reserved for the default policy, set it with [default_policy]")]
    ReservedClass(String),

    #[error("failed to read config file: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

// Errors surfaced by the HTTP handlers
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Guard(#[from] GuardError),

    #[error("Forbidden")]
    Forbidden,

    #[error("Malformed payload")]
    MalformedPayload,

    #[error("No upstream configured")]
    NoUpstream,

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Guard(GuardError::InvalidSession) => StatusCode::BAD_REQUEST,
            AppError::Guard(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::NoUpstream => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // 5xx detail (upstream URLs, internal state) stays in the log
        let message = match &self {
            AppError::Upstream(_) => "Bad gateway".to_string(),
            AppError::NoUpstream => self.to_string(),
            _ if status.is_server_error() => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
