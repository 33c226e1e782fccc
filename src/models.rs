use serde::{Deserialize, Serialize};

// Body of GET /api/csrf-token
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TokenResponse {
    pub csrf_token: String,
    pub expires_in_ms: u64,
}

// Body of a 429 / 403 from the guard
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct RejectionBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

// Body of DELETE /admin/rate-limits/{class}/{identifier}
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ResetResponse {
    pub class: String,
    pub identifier: String,
    pub cleared: bool,
}
