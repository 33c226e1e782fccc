// Integration tests for the guard gateway: router + middleware + stores

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Request, StatusCode, request},
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

use request_guard::clock::ManualClock;
use request_guard::config::GuardConfig;
use request_guard::guard::Guard;
use request_guard::rate_limit::CounterStore;
use request_guard::server::build_router;
use request_guard::state::AppState;
use request_guard::token::TokenStore;

const CALLER: &str = "203.0.113.7";
const PROXY: &str = "127.0.0.1:40000";
const ADMIN_KEY: &str = "admin-secret";

struct TestApp {
    clock: Arc<ManualClock>,
    router: Router,
}

impl TestApp {
    fn new(upstream: Option<String>) -> Self {
        let config = GuardConfig {
            trusted_proxies: vec![peer(PROXY).ip()],
            ..GuardConfig::default()
        };
        let policies = config.policy_table().unwrap();
        let routes = config.route_table(&policies).unwrap();

        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let counters = Arc::new(CounterStore::new(clock.clone()));
        let tokens = Arc::new(TokenStore::new(clock.clone()));
        let guard = Guard::new(counters.clone(), tokens.clone(), policies, false);

        let state = Arc::new(AppState {
            guard,
            counters,
            tokens,
            routes,
            trusted_proxies: config.trusted_proxies.clone(),
            token_lifetime_ms: config.token_lifetime_ms,
            admin_key: Some(ADMIN_KEY.to_string()),
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
            upstream,
        });

        Self {
            clock,
            router: build_router(state),
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

// Upstream that echoes "METHOD /path"
async fn spawn_upstream() -> String {
    let app = Router::new().fallback(|request: Request<Body>| async move {
        format!("{} {}", request.method(), request.uri().path())
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}", addr)
}

fn peer(addr: &str) -> SocketAddr {
    addr.parse().unwrap()
}

// What the server sees when the trusted proxy relays CALLER's request
fn via_proxy(builder: request::Builder) -> request::Builder {
    builder
        .extension(ConnectInfo(peer(PROXY)))
        .header("x-forwarded-for", CALLER)
}

fn get(uri: &str) -> Request<Body> {
    via_proxy(Request::get(uri)).body(Body::empty()).unwrap()
}

fn post(uri: &str, session: Option<&str>, token: Option<&str>) -> Request<Body> {
    let mut builder = via_proxy(Request::post(uri));
    if let Some(session) = session {
        builder = builder.header("cookie", format!("session_id={}", session));
    }
    if let Some(token) = token {
        builder = builder.header("x-csrf-token", token);
    }
    builder.body(Body::from("{}")).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

async fn issue_token(app: &TestApp, session: &str) -> String {
    let request = via_proxy(Request::get("/api/csrf-token"))
        .header("x-session-id", session)
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["csrf_token"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn auth_class_allows_five_then_returns_429() {
    let app = TestApp::new(Some(spawn_upstream().await));

    for expected_remaining in (0..5).rev() {
        let response = app.send(get("/api/auth/status")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["x-ratelimit-remaining"],
            expected_remaining.to_string().as_str()
        );
        assert_eq!(body_text(response).await, "GET /api/auth/status");
    }

    let response = app.send(get("/api/auth/status")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "60");

    let body = body_json(response).await;
    assert_eq!(body["error"], "rate_limited");
    let retry_after_ms = body["retry_after_ms"].as_u64().unwrap();
    assert!(retry_after_ms > 0 && retry_after_ms <= 60_000);
}

#[tokio::test]
async fn window_expiry_admits_again() {
    let app = TestApp::new(Some(spawn_upstream().await));

    for _ in 0..5 {
        app.send(get("/api/auth/status")).await;
    }
    assert_eq!(
        app.send(get("/api/auth/status")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    app.clock.advance(60_000);
    let response = app.send(get("/api/auth/status")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
}

#[tokio::test]
async fn mutating_auth_request_needs_a_valid_token() {
    let app = TestApp::new(Some(spawn_upstream().await));

    let response = app.send(post("/api/auth/login", Some("s-1"), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "csrf_rejected");

    let token = issue_token(&app, "s-1").await;

    let response = app
        .send(post("/api/auth/login", Some("s-1"), Some("forged")))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // token is bound to its session
    let response = app
        .send(post("/api/auth/login", Some("s-2"), Some(&token)))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(post("/api/auth/login", Some("s-1"), Some(&token)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "POST /api/auth/login");
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let app = TestApp::new(Some(spawn_upstream().await));
    let token = issue_token(&app, "s-1").await;

    app.clock.advance(3_600_001);
    let response = app
        .send(post("/api/messages", Some("s-1"), Some(&token)))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn logout_invalidates_the_token() {
    let app = TestApp::new(Some(spawn_upstream().await));
    let token = issue_token(&app, "s-1").await;

    let response = app
        .send(post("/api/session/logout", Some("s-1"), Some(&token)))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .send(post("/api/payments", Some("s-1"), Some(&token)))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn token_request_without_session_is_bad_request() {
    let app = TestApp::new(None);
    let response = app.send(get("/api/csrf-token")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_reset_unblocks_a_caller() {
    let app = TestApp::new(Some(spawn_upstream().await));
    for _ in 0..6 {
        app.send(get("/api/auth/status")).await;
    }
    assert_eq!(
        app.send(get("/api/auth/status")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    let reset = |key: &'static str| {
        Request::delete(format!("/admin/rate-limits/auth/{}", CALLER))
            .extension(ConnectInfo(peer("192.0.2.1:50000")))
            .header("x-admin-key", key)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(
        app.send(reset("wrong")).await.status(),
        StatusCode::FORBIDDEN
    );

    let response = app.send(reset(ADMIN_KEY)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["cleared"], true);

    assert_eq!(
        app.send(get("/api/auth/status")).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn callers_without_identity_share_one_bucket() {
    let app = TestApp::new(Some(spawn_upstream().await));
    let anonymous = || Request::get("/api/auth/status").body(Body::empty()).unwrap();

    for _ in 0..5 {
        assert_eq!(app.send(anonymous()).await.status(), StatusCode::OK);
    }
    assert_eq!(
        app.send(anonymous()).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    // a caller with an address is unaffected
    assert_eq!(
        app.send(get("/api/auth/status")).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn health_and_metrics_bypass_the_guard() {
    let app = TestApp::new(None);

    for _ in 0..100 {
        let response = app.send(get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-remaining").is_none());
    }

    app.send(get("/api/courses")).await;
    let response = app.send(get("/metrics")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("guard_decisions_total"));
}

#[tokio::test]
async fn missing_upstream_is_service_unavailable() {
    let app = TestApp::new(None);
    let response = app.send(get("/api/courses")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    // still counted
    assert_eq!(response.headers()["x-ratelimit-remaining"], "99");
}

#[tokio::test]
async fn rotating_forwarded_for_from_untrusted_peer_is_still_limited() {
    let app = TestApp::new(Some(spawn_upstream().await));
    let direct = peer("198.51.100.9:41000");

    let mut statuses = Vec::new();
    for i in 0..50 {
        let request = Request::get("/api/auth/status")
            .extension(ConnectInfo(direct))
            .header("x-forwarded-for", format!("10.9.9.{}", i))
            .header("x-real-ip", format!("10.8.8.{}", i))
            .body(Body::empty())
            .unwrap();
        statuses.push(app.send(request).await.status());
    }

    assert!(statuses[..5].iter().all(|s| *s == StatusCode::OK));
    assert!(
        statuses[5..]
            .iter()
            .all(|s| *s == StatusCode::TOO_MANY_REQUESTS)
    );

    // the peer address is the key, not any header value
    let reset = Request::delete("/admin/rate-limits/auth/198.51.100.9")
        .extension(ConnectInfo(peer("192.0.2.1:50000")))
        .header("x-admin-key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap();
    assert_eq!(body_json(app.send(reset).await).await["cleared"], true);
}

#[tokio::test]
async fn trusted_proxy_relays_distinct_callers() {
    let app = TestApp::new(Some(spawn_upstream().await));

    for _ in 0..5 {
        app.send(get("/api/auth/status")).await;
    }
    assert_eq!(
        app.send(get("/api/auth/status")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    let other = Request::get("/api/auth/status")
        .extension(ConnectInfo(peer(PROXY)))
        .header("x-forwarded-for", "203.0.113.99, 127.0.0.1")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(other).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway_without_detail() {
    let app = TestApp::new(Some("http://127.0.0.1:1".to_string()));

    let response = app.send(get("/api/courses")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = body_text(response).await;
    assert!(!body.contains("127.0.0.1"));
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&body).unwrap(),
        serde_json::json!({ "error": "Bad gateway" })
    );
}
