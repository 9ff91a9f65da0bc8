//! Gateway behavior against a local stub API: bearer attachment, the
//! one-shot 401 refresh-and-retry protocol, and session-expiry handling.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use hearth_sync::{ApiError, ApiGateway, Endpoint, MemoryTokenStore, SyncError, TokenStore};

#[derive(Debug, Deserialize)]
struct Widget {
    value: i64,
}

/// Stub API state: which bearer is currently valid, plus call counters.
struct Stub {
    valid_bearer: &'static str,
    accept_refresh: bool,
    widget_always_401: bool,
    widget_hits: AtomicU32,
    refreshes: AtomicU32,
    saw_auth_header: AtomicBool,
}

impl Stub {
    fn new(valid_bearer: &'static str, accept_refresh: bool) -> Arc<Self> {
        Arc::new(Stub {
            valid_bearer,
            accept_refresh,
            widget_always_401: false,
            widget_hits: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
            saw_auth_header: AtomicBool::new(false),
        })
    }

    fn always_401(valid_bearer: &'static str) -> Arc<Self> {
        Arc::new(Stub {
            valid_bearer,
            accept_refresh: true,
            widget_always_401: true,
            widget_hits: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
            saw_auth_header: AtomicBool::new(false),
        })
    }
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": { "code": "token_expired", "message": "expired", "request_id": "req-1" }
        })),
    )
}

async fn widget(State(stub): State<Arc<Stub>>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    stub.widget_hits.fetch_add(1, Ordering::SeqCst);

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if bearer.is_some() {
        stub.saw_auth_header.store(true, Ordering::SeqCst);
    }

    if !stub.widget_always_401 && bearer == Some(format!("Bearer {}", stub.valid_bearer).as_str()) {
        (StatusCode::OK, Json(json!({ "value": 42 })))
    } else {
        unauthorized()
    }
}

async fn refresh(State(stub): State<Arc<Stub>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    stub.refreshes.fetch_add(1, Ordering::SeqCst);

    if stub.accept_refresh && body["refresh_token"] == json!("refresh-1") {
        (
            StatusCode::OK,
            Json(json!({ "access_token": stub.valid_bearer, "refresh_token": "refresh-2" })),
        )
    } else {
        unauthorized()
    }
}

async fn teapot() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": { "code": "invalid", "message": "due_at is in the past" } })),
    )
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["email"] == json!("kim@example.com") && body["password"] == json!("hunter2") {
        (
            StatusCode::OK,
            Json(json!({ "access_token": "login-access", "refresh_token": "login-refresh" })),
        )
    } else {
        unauthorized()
    }
}

async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Binds the stub on an ephemeral port; returns a gateway base URL.
async fn spawn_stub(stub: Arc<Stub>) -> String {
    let app = Router::new()
        .route("/v1/widget", get(widget))
        .route("/v1/auth/refresh", post(refresh))
        .route("/v1/invalid", get(teapot))
        .route("/v1/quiet", post(no_content))
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/logout", post(logout))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/v1")
}

#[tokio::test]
async fn fresh_token_decodes_the_body() {
    let stub = Stub::new("good", true);
    let base = spawn_stub(stub.clone()).await;

    let tokens = Arc::new(MemoryTokenStore::with_tokens("good", "refresh-1"));
    let gateway = ApiGateway::new(&base, tokens).unwrap();

    let widget: Widget = gateway.request(Endpoint::get("widget")).await.unwrap();
    assert_eq!(widget.value, 42);
    assert_eq!(stub.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn a_401_triggers_one_refresh_and_the_retried_body_comes_back() {
    let stub = Stub::new("good", true);
    let base = spawn_stub(stub.clone()).await;

    let tokens = Arc::new(MemoryTokenStore::with_tokens("stale", "refresh-1"));
    let gateway = ApiGateway::new(&base, tokens.clone()).unwrap();

    let widget: Widget = gateway.request(Endpoint::get("widget")).await.unwrap();
    assert_eq!(widget.value, 42);

    // Exactly one refresh, and the new pair is persisted.
    assert_eq!(stub.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(stub.widget_hits.load(Ordering::SeqCst), 2);
    let stored = tokens.load().await.unwrap();
    assert_eq!(stored.access_token, "good");
    assert_eq!(stored.refresh_token, "refresh-2");
}

#[tokio::test]
async fn the_retried_request_never_refreshes_again() {
    // The refresh succeeds, but the retried call still 401s. That must
    // surface as Unauthorized after exactly one refresh attempt.
    let stub = Stub::always_401("good");
    let base = spawn_stub(stub.clone()).await;

    let tokens = Arc::new(MemoryTokenStore::with_tokens("stale", "refresh-1"));
    let gateway = ApiGateway::new(&base, tokens).unwrap();

    let result: Result<Widget, _> = gateway.request(Endpoint::get("widget")).await;

    assert!(matches!(
        result,
        Err(SyncError::Api(ApiError::Unauthorized))
    ));
    assert_eq!(stub.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(stub.widget_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_refresh_clears_tokens_and_fires_session_expired() {
    let stub = Stub::new("good", false);
    let base = spawn_stub(stub.clone()).await;

    let tokens = Arc::new(MemoryTokenStore::with_tokens("stale", "refresh-1"));
    let gateway = ApiGateway::new(&base, tokens.clone()).unwrap();

    let expired = Arc::new(AtomicBool::new(false));
    let expired_flag = expired.clone();
    gateway.on_session_expired(move || {
        expired_flag.store(true, Ordering::SeqCst);
    });

    let result: Result<Widget, _> = gateway.request(Endpoint::get("widget")).await;

    match result {
        Err(SyncError::Api(ApiError::Unauthorized)) => {}
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    assert!(expired.load(Ordering::SeqCst));
    assert!(tokens.load().await.is_none());
    // The original request is not retried after a failed refresh.
    assert_eq!(stub.widget_hits.load(Ordering::SeqCst), 1);
    assert_eq!(stub.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_tokens_omit_the_bearer_silently() {
    let stub = Stub::new("good", true);
    let base = spawn_stub(stub.clone()).await;

    let tokens = Arc::new(MemoryTokenStore::new());
    let gateway = ApiGateway::new(&base, tokens.clone()).unwrap();

    let result: Result<Widget, _> = gateway.request(Endpoint::get("widget")).await;

    // No stored refresh token either, so the 401 ends the session.
    assert!(matches!(
        result,
        Err(SyncError::Api(ApiError::Unauthorized))
    ));
    assert!(!stub.saw_auth_header.load(Ordering::SeqCst));
}

#[tokio::test]
async fn validation_errors_carry_the_envelope_message() {
    let stub = Stub::new("good", true);
    let base = spawn_stub(stub).await;

    let tokens = Arc::new(MemoryTokenStore::with_tokens("good", "refresh-1"));
    let gateway = ApiGateway::new(&base, tokens).unwrap();

    let result: Result<Widget, _> = gateway.request(Endpoint::get("invalid")).await;
    match result {
        Err(SyncError::Api(ApiError::Validation(message))) => {
            assert_eq!(message, "due_at is in the past");
        }
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn a_204_maps_to_unit() {
    let stub = Stub::new("good", true);
    let base = spawn_stub(stub).await;

    let tokens = Arc::new(MemoryTokenStore::with_tokens("good", "refresh-1"));
    let gateway = ApiGateway::new(&base, tokens).unwrap();

    gateway.request_unit(Endpoint::post("quiet")).await.unwrap();
}

#[tokio::test]
async fn login_stores_the_pair_and_logout_clears_it() {
    let stub = Stub::new("login-access", true);
    let base = spawn_stub(stub).await;

    let tokens = Arc::new(MemoryTokenStore::new());
    let gateway = ApiGateway::new(&base, tokens.clone()).unwrap();

    gateway.login("kim@example.com", "hunter2").await.unwrap();
    let stored = tokens.load().await.unwrap();
    assert_eq!(stored.access_token, "login-access");
    assert_eq!(stored.refresh_token, "login-refresh");

    gateway.logout().await.unwrap();
    assert!(tokens.load().await.is_none());
}

#[tokio::test]
async fn bad_login_surfaces_unauthorized_without_touching_the_store() {
    let stub = Stub::new("login-access", true);
    let base = spawn_stub(stub).await;

    let tokens = Arc::new(MemoryTokenStore::new());
    let gateway = ApiGateway::new(&base, tokens.clone()).unwrap();

    let result = gateway.login("kim@example.com", "wrong").await;
    assert!(matches!(
        result,
        Err(SyncError::Api(ApiError::Unauthorized))
    ));
    assert!(tokens.load().await.is_none());
}

#[tokio::test]
async fn transport_failures_map_to_transport() {
    // Nothing listens on this port.
    let tokens = Arc::new(MemoryTokenStore::with_tokens("good", "refresh-1"));
    let gateway = ApiGateway::new("http://127.0.0.1:9/v1", tokens).unwrap();

    let result: Result<Widget, _> = gateway.request(Endpoint::get("widget").public()).await;
    assert!(matches!(
        result,
        Err(SyncError::Api(ApiError::Transport(_)))
    ));
}
