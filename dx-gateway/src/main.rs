//! DX Gateway
//!
//! Reference peer for the envelope protocol. Issues single-use prekeys,
//! accepts sealed logins and echoes sealed requests back.
//!
//! Configuration (environment variables):
//!   DX_GATEWAY_PORT      - Listen port (default: 3000)
//!   DX_PREKEY_TTL_SECS   - Lifetime of an unused prekey (default: 300)
//!   DX_MAX_PREKEYS       - Outstanding prekeys before the oldest is evicted (default: 10000)
//!   DX_SESSION_TTL_SECS  - Lifetime of a login session key (default: 86400)
//!   DX_DEMO_USER         - Login accepted by /self/login (default: demo)
//!   DX_DEMO_PASSWORD     - Password for DX_DEMO_USER (default: demo-password)
//!   DX_LOG_FORMAT        - "json" for structured logging, "pretty" for dev
//!
//! Endpoints:
//!   GET  /health
//!   POST /self/prekey    {a0,a1,a2} -> {i,b0,b1,b2}
//!   POST /self/login     {i,d} sealed [user, password] -> {d} sealed [{session_key,user_id}]
//!   POST /self/detail    Bearer session key -> {user_id, logged_in_at}
//!   POST /self/logout    Bearer session key
//!   POST /e2ee/echo      {i,d} sealed [header, body] -> {d} sealed [status, header, body]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dx_envelope::{Lv, PrekeyRequest};
use dx_session::{Headers, PrekeyStoreConfig, Responder, SecuredRequestBody, SessionError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tower_http::cors::{Any, CorsLayer};

const SESSION_KEY_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct GatewayConfig {
    port: u16,
    prekeys: PrekeyStoreConfig,
    session_ttl: Duration,
    demo_user: String,
    demo_password: String,
}

impl GatewayConfig {
    fn from_env() -> Self {
        let defaults = PrekeyStoreConfig::default();
        let ttl_secs = env_parse("DX_PREKEY_TTL_SECS").unwrap_or(defaults.ttl.as_secs());
        Self {
            port: env_parse("DX_GATEWAY_PORT").unwrap_or(3000),
            prekeys: PrekeyStoreConfig {
                ttl: Duration::from_secs(ttl_secs),
                max_outstanding: env_parse("DX_MAX_PREKEYS").unwrap_or(defaults.max_outstanding),
            },
            session_ttl: Duration::from_secs(env_parse("DX_SESSION_TTL_SECS").unwrap_or(86_400)),
            demo_user: std::env::var("DX_DEMO_USER").unwrap_or_else(|_| "demo".into()),
            demo_password: std::env::var("DX_DEMO_PASSWORD").unwrap_or_else(|_| "demo-password".into()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

struct LoginRecord {
    user_id: String,
    logged_in_at: String,
    issued_at: Instant,
}

struct AppState {
    responder: Responder,
    /// Keyed by SHA-256 hex of the session key; raw keys are never stored.
    logins: RwLock<HashMap<String, LoginRecord>>,
    session_ttl: Duration,
    demo_user: String,
    demo_password: String,
}

type Shared = Arc<AppState>;

impl AppState {
    fn new(config: &GatewayConfig) -> Self {
        Self {
            responder: Responder::new(config.prekeys),
            logins: RwLock::new(HashMap::new()),
            session_ttl: config.session_ttl,
            demo_user: config.demo_user.clone(),
            demo_password: config.demo_password.clone(),
        }
    }

    fn credentials_match(&self, user: &[u8], password: &[u8]) -> bool {
        let user_ok: bool = ct_eq(self.demo_user.as_bytes(), user);
        let password_ok: bool = ct_eq(self.demo_password.as_bytes(), password);
        user_ok & password_ok
    }

    async fn login_for(&self, headers: &HeaderMap) -> Option<(String, String)> {
        let token = bearer(headers)?;
        let logins = self.logins.read().await;
        logins
            .get(&hash_session_key(token))
            .filter(|r| r.issued_at.elapsed() < self.session_ttl)
            .map(|r| (r.user_id.clone(), r.logged_in_at.clone()))
    }

    /// Drop session keys older than the session TTL.
    async fn purge_logins(&self) -> usize {
        let mut logins = self.logins.write().await;
        let before = logins.len();
        logins.retain(|_, r| r.issued_at.elapsed() < self.session_ttl);
        let purged = before - logins.len();
        if purged > 0 {
            tracing::info!(purged, remaining = logins.len(), "purged expired session keys");
        }
        purged
    }
}

fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}

fn hash_session_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn new_session_key() -> Result<String, SessionError> {
    let mut raw = [0u8; SESSION_KEY_BYTES];
    getrandom::getrandom(&mut raw).map_err(|_| SessionError::Random)?;
    Ok(hex::encode(raw))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ApiError {
    error: String,
    reason: String,
}

fn reject(status: StatusCode, error: &str, reason: impl Into<String>) -> Response {
    (
        status,
        Json(ApiError {
            error: error.into(),
            reason: reason.into(),
        }),
    )
        .into_response()
}

/// Map a session-layer failure to a reply. Anything that stops a sealed
/// request from opening is 422, so clients know to redo the handshake.
fn session_reject(e: &SessionError) -> Response {
    match e {
        SessionError::Random => {
            tracing::error!(kind = e.kind(), "random source failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, e.kind(), e.to_string())
        }
        SessionError::Envelope(dx_envelope::EnvelopeError::Encryption(_)) => {
            tracing::error!(kind = e.kind(), "failed to seal reply");
            reject(StatusCode::INTERNAL_SERVER_ERROR, e.kind(), e.to_string())
        }
        _ => {
            tracing::warn!(kind = e.kind(), "rejected request: {}", e);
            reject(StatusCode::UNPROCESSABLE_ENTITY, e.kind(), e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

async fn post_prekey(State(state): State<Shared>, Json(req): Json<PrekeyRequest>) -> Response {
    match state.responder.prekey(&req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => session_reject(&e),
    }
}

async fn post_login(State(state): State<Shared>, Json(req): Json<SecuredRequestBody>) -> Response {
    let (session, payload) = match state.responder.open(&req).await {
        Ok(opened) => opened,
        Err(e) => return session_reject(&e),
    };
    let (user, password) = match (payload.first(), payload.get(1)) {
        (Some(user), Some(password)) => (user, password),
        _ => return session_reject(&SessionError::MissingField("password")),
    };
    if !state.credentials_match(user.value(), password.value()) {
        tracing::warn!(prekey = %req.i, "invalid credentials");
        return reject(StatusCode::UNAUTHORIZED, "INVALID_CREDENTIAL", "user or password mismatch");
    }

    let session_key = match new_session_key() {
        Ok(key) => key,
        Err(e) => return session_reject(&e),
    };
    let user_id = "1".to_string();
    let reply = Lv::from_json_value(&serde_json::json!({
        "session_key": session_key,
        "user_id": user_id,
    }))
    .map_err(SessionError::from)
    .and_then(|lv| state.responder.seal(&session, &[lv]));

    match reply {
        Ok(sealed) => {
            state.logins.write().await.insert(
                hash_session_key(&session_key),
                LoginRecord {
                    user_id: user_id.clone(),
                    logged_in_at: chrono::Utc::now().to_rfc3339(),
                    issued_at: Instant::now(),
                },
            );
            tracing::info!(user_id = %user_id, "user logged in");
            Json(sealed).into_response()
        }
        Err(e) => session_reject(&e),
    }
}

async fn post_detail(State(state): State<Shared>, headers: HeaderMap) -> Response {
    match state.login_for(&headers).await {
        Some((user_id, logged_in_at)) => {
            Json(serde_json::json!({"user_id": user_id, "logged_in_at": logged_in_at})).into_response()
        }
        None => reject(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "missing or unknown session key"),
    }
}

async fn post_logout(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let removed = match bearer(&headers) {
        Some(token) => state.logins.write().await.remove(&hash_session_key(token)),
        None => None,
    };
    match removed {
        Some(record) => {
            tracing::info!(user_id = %record.user_id, "user logged out");
            Json(serde_json::json!({"status": "logged_out"})).into_response()
        }
        None => reject(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "missing or unknown session key"),
    }
}

async fn post_echo(State(state): State<Shared>, Json(req): Json<SecuredRequestBody>) -> Response {
    let opened = match state.responder.open_request(&req).await {
        Ok(opened) => opened,
        Err(e) => return session_reject(&e),
    };

    let echoed = serde_json::json!({"header": opened.header, "body": opened.body});
    let mut header = Headers::new();
    header.insert("Content-Type".into(), "application/json".into());

    let reply = serde_json::to_vec(&echoed)
        .map_err(SessionError::from)
        .and_then(|body| state.responder.seal_response(&opened.session, 200, &header, &body));
    match reply {
        Ok(sealed) => Json(sealed).into_response(),
        Err(e) => session_reject(&e),
    }
}

fn app(state: Shared) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/self/prekey", post(post_prekey))
        .route("/self/login", post(post_login))
        .route("/self/detail", post(post_detail))
        .route("/self/logout", post(post_logout))
        .route("/e2ee/echo", post(post_echo))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_format = std::env::var("DX_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dx_gateway=info,dx_session=info,dx_envelope=warn".into());
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).with_target(true).with_thread_ids(true).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = GatewayConfig::from_env();
    let state: Shared = Arc::new(AppState::new(&config));

    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_state.responder.store().purge_expired().await;
            cleanup_state.purge_logins().await;
        }
    });

    tracing::info!(
        port = config.port,
        prekey_ttl_secs = config.prekeys.ttl.as_secs(),
        max_prekeys = config.prekeys.max_outstanding,
        session_ttl_secs = config.session_ttl.as_secs(),
        "starting DX Gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use dx_envelope::{PrekeyBundle, Session};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_state() -> Shared {
        let config = GatewayConfig {
            port: 0,
            prekeys: PrekeyStoreConfig::default(),
            session_ttl: Duration::from_secs(3600),
            demo_user: "alice".into(),
            demo_password: "wonderland".into(),
        };
        Arc::new(AppState::new(&config))
    }

    fn test_app() -> Router {
        app(test_state())
    }

    async fn log_in(app: &Router) -> String {
        let session = handshake(app).await;
        let (status, body) = call(
            app,
            "/self/login",
            Some(sealed(&session, &[Lv::from_utf8("alice"), Lv::from_utf8("wonderland")])),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let lvs = session.unpack(body["d"].as_str().unwrap()).unwrap();
        let login: Value = serde_json::from_slice(lvs[0].value()).unwrap();
        login["session_key"].as_str().unwrap().to_string()
    }

    async fn call(app: &Router, path: &str, body: Option<Value>, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(v) => Body::from(serde_json::to_vec(&v).unwrap()),
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn handshake(app: &Router) -> Session {
        let bundle = PrekeyBundle::generate();
        let (status, body) = call(app, "/self/prekey", Some(serde_json::to_value(bundle.request()).unwrap()), None).await;
        assert_eq!(status, StatusCode::OK);
        bundle.complete(&serde_json::from_value(body).unwrap()).unwrap()
    }

    fn sealed(session: &Session, payload: &[Lv]) -> Value {
        json!({"i": session.prekey_index(), "d": session.pack(payload).unwrap()})
    }

    #[tokio::test]
    async fn health_ok() {
        let app = test_app();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn echo_roundtrip() {
        let app = test_app();
        let session = handshake(&app).await;
        let payload = dx_session::secured::encode_request(&Headers::new(), &json!({"ping": 1})).unwrap();

        let (status, body) = call(&app, "/e2ee/echo", Some(sealed(&session, &payload)), None).await;
        assert_eq!(status, StatusCode::OK);

        let lvs = session.unpack(body["d"].as_str().unwrap()).unwrap();
        let synthetic = dx_session::secured::decode_response(&lvs).unwrap();
        assert_eq!(synthetic.status, 200);
        let echoed: Value = synthetic.json().unwrap();
        assert_eq!(echoed["body"]["ping"], 1);
    }

    #[tokio::test]
    async fn reused_prekey_asks_for_refresh() {
        let app = test_app();
        let session = handshake(&app).await;
        let payload = dx_session::secured::encode_request(&Headers::new(), &json!({})).unwrap();
        let body = sealed(&session, &payload);

        let (status, _) = call(&app, "/e2ee/echo", Some(body.clone()), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, reply) = call(&app, "/e2ee/echo", Some(body), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(reply["error"], "REFRESH_PREKEY");
        assert!(reply.get("d").is_none());
    }

    #[tokio::test]
    async fn login_detail_logout() {
        let app = test_app();
        let session = handshake(&app).await;
        let (status, body) = call(
            &app,
            "/self/login",
            Some(sealed(&session, &[Lv::from_utf8("alice"), Lv::from_utf8("wonderland")])),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let lvs = session.unpack(body["d"].as_str().unwrap()).unwrap();
        let login: Value = serde_json::from_slice(lvs[0].value()).unwrap();
        let key = login["session_key"].as_str().unwrap().to_string();
        assert_eq!(key.len(), SESSION_KEY_BYTES * 2);

        let (status, detail) = call(&app, "/self/detail", None, Some(&key)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["user_id"], "1");

        let (status, _) = call(&app, "/self/logout", None, Some(&key)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "/self/detail", None, Some(&key)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(start_paused = true)]
    async fn session_keys_expire_and_are_purged() {
        let state = test_state();
        let app = app(state.clone());
        let key = log_in(&app).await;

        tokio::time::advance(Duration::from_secs(3599)).await;
        let (status, _) = call(&app, "/self/detail", None, Some(&key)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.purge_logins().await, 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        let (status, _) = call(&app, "/self/detail", None, Some(&key)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(state.purge_logins().await, 1);
        assert!(state.logins.read().await.is_empty());
    }

    #[tokio::test]
    async fn bad_password_unauthorized() {
        let app = test_app();
        let session = handshake(&app).await;
        let (status, body) = call(
            &app,
            "/self/login",
            Some(sealed(&session, &[Lv::from_utf8("alice"), Lv::from_utf8("nope")])),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "INVALID_CREDENTIAL");
    }

    #[tokio::test]
    async fn malformed_prekey_request() {
        let app = test_app();
        let (status, body) = call(
            &app,
            "/self/prekey",
            Some(json!({"a0": "00", "a1": "00", "a2": "00"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "INVALID_KEY");
    }

    #[test]
    fn credential_check() {
        let config = GatewayConfig {
            port: 0,
            prekeys: PrekeyStoreConfig::default(),
            session_ttl: Duration::from_secs(3600),
            demo_user: "u".into(),
            demo_password: "p".into(),
        };
        let state = AppState::new(&config);
        assert!(state.credentials_match(b"u", b"p"));
        assert!(!state.credentials_match(b"u", b"q"));
        assert!(!state.credentials_match(b"", b"p"));
    }
}
