//! Shared fixtures: a scripted verifier for manager-level tests and a mock OAuth
//! authority (token, introspection and permission endpoints) for end-to-end tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Form, State};
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;

use sessiongate::config::{AuthConfig, CookieConfig, OAuthConfig};
use sessiongate::identity::{HttpTokenVerifier, Introspection, Token, TokenVerifier};
use sessiongate::manager::AuthSessionManager;
use sessiongate::identity::SessionRecord;
use sessiongate::store::{CookieSessionStore, SessionStore};

pub const SESSION: &str = "sg_test";
pub const CLIENT_ID: &str = "dashboard";

pub fn test_config(authority: &str, callback_url: &str) -> AuthConfig {
    let b64 = |byte: u8| base64::engine::general_purpose::STANDARD.encode([byte; 32]);
    AuthConfig {
        session_name: SESSION.to_string(),
        cookie: Some(CookieConfig { signing_key: b64(7), encryption_key: b64(9), secure: false }),
        oauth: OAuthConfig {
            client_id: CLIENT_ID.to_string(),
            client_secret: "s3cret".to_string(),
            scopes: vec!["openid".to_string()],
            auth_url: format!("{authority}/authorize"),
            token_url: format!("{authority}/token"),
            introspection_url: Some(format!("{authority}/introspect")),
            permissions_url: Some(format!("{authority}/permissions")),
        },
        callback_url: callback_url.to_string(),
        logout_path: "/logout".to_string(),
        logout_redirect: "/".to_string(),
        session_ttl_secs: 3600,
        permission_ttl_secs: 600,
    }
}

pub fn bearer_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
    headers
}

pub fn cookie_headers(name: &str, value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_str(&format!("{name}={value}")).unwrap());
    headers
}

/// Request headers a browser would send back after receiving `response`.
pub fn echo_cookies(response: &HeaderMap) -> HeaderMap {
    let pairs: Vec<String> = response
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_string())
        .collect();
    let mut headers = HeaderMap::new();
    if !pairs.is_empty() {
        headers.insert(COOKIE, HeaderValue::from_str(&pairs.join("; ")).unwrap());
    }
    headers
}

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Verifier whose answers are set by the test, counting every call.
pub struct FakeVerifier {
    pub subject: String,
    pub audience: Mutex<String>,
    pub expires_at: Mutex<Option<i64>>,
    pub permissions: Mutex<Vec<String>>,
    pub fail_introspection: AtomicBool,
    pub last_token: Mutex<Option<String>>,
    introspections: AtomicUsize,
    permission_lookups: AtomicUsize,
}

impl FakeVerifier {
    pub fn new(audience: &str) -> Arc<Self> {
        Arc::new(Self {
            subject: "alice".to_string(),
            audience: Mutex::new(audience.to_string()),
            expires_at: Mutex::new(Some(now_secs() + 3600)),
            permissions: Mutex::new(Vec::new()),
            fail_introspection: AtomicBool::new(false),
            last_token: Mutex::new(None),
            introspections: AtomicUsize::new(0),
            permission_lookups: AtomicUsize::new(0),
        })
    }

    pub fn set_permissions(&self, perms: &[&str]) {
        *self.permissions.lock() = perms.iter().map(|p| p.to_string()).collect();
    }

    pub fn introspections(&self) -> usize {
        self.introspections.load(Ordering::SeqCst)
    }

    pub fn permission_lookups(&self) -> usize {
        self.permission_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenVerifier for FakeVerifier {
    async fn introspect_token(&self, access_token: &str) -> anyhow::Result<Introspection> {
        self.introspections.fetch_add(1, Ordering::SeqCst);
        *self.last_token.lock() = Some(access_token.to_string());
        if self.fail_introspection.load(Ordering::SeqCst) {
            anyhow::bail!("authority unavailable");
        }
        let mut extra = Map::new();
        extra.insert("scope".into(), Value::String("openid".into()));
        Ok(Introspection {
            subject: self.subject.clone(),
            audience: self.audience.lock().clone(),
            expires_at: *self.expires_at.lock(),
            extra,
        })
    }

    async fn get_permissions(&self, _subject: &str, _audience: &str, _token: &Token) -> anyhow::Result<Vec<String>> {
        self.permission_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.permissions.lock().clone())
    }
}

/// Manager over `store` and a fake verifier, with authority URLs that are never contacted.
pub fn fake_manager(store: Arc<dyn SessionStore>, verifier: Arc<FakeVerifier>) -> AuthSessionManager {
    let config = test_config("https://auth.example.com", "https://app.example.com/callback");
    AuthSessionManager::new(&config, store, verifier).unwrap()
}

#[derive(Debug, Clone)]
pub struct Grant {
    pub subject: String,
    pub client_id: String,
    pub permissions: Vec<String>,
    pub expires_at: i64,
}

impl Grant {
    pub fn new(subject: &str, permissions: &[&str]) -> Self {
        Self {
            subject: subject.to_string(),
            client_id: CLIENT_ID.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            expires_at: now_secs() + 3600,
        }
    }
}

#[derive(Clone, Default)]
pub struct AuthorityState {
    // code -> (access token, expires_in)
    codes: Arc<Mutex<HashMap<String, (String, Option<i64>)>>>,
    tokens: Arc<Mutex<HashMap<String, Grant>>>,
    introspections: Arc<AtomicUsize>,
    permission_lookups: Arc<AtomicUsize>,
}

/// In-process OAuth authority bound to an ephemeral port.
pub struct MockAuthority {
    pub base: String,
    pub state: AuthorityState,
    handle: JoinHandle<()>,
}

impl MockAuthority {
    pub async fn start() -> anyhow::Result<Self> {
        let state = AuthorityState::default();
        let app = Router::new()
            .route("/token", post(token))
            .route("/introspect", post(introspect))
            .route("/permissions", get(permissions))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("mock authority error: {e}");
            }
        });
        Ok(Self { base: format!("http://{addr}"), state, handle })
    }

    /// Register a token the authority will recognise during introspection.
    pub fn register_token(&self, token: &str, grant: Grant) {
        self.state.tokens.lock().insert(token.to_string(), grant);
    }

    /// Register a one-time code redeemable for `token`, valid for an hour.
    pub fn issue_code(&self, code: &str, token: &str, grant: Grant) {
        self.issue_code_expiring(code, token, grant, Some(3600));
    }

    /// Like `issue_code`, with the token response's `expires_in` set to `expires_in`
    /// (left out entirely when `None`).
    pub fn issue_code_expiring(&self, code: &str, token: &str, grant: Grant, expires_in: Option<i64>) {
        self.register_token(token, grant);
        self.state.codes.lock().insert(code.to_string(), (token.to_string(), expires_in));
    }

    pub fn introspections(&self) -> usize {
        self.state.introspections.load(Ordering::SeqCst)
    }

    pub fn permission_lookups(&self) -> usize {
        self.state.permission_lookups.load(Ordering::SeqCst)
    }
}

impl Drop for MockAuthority {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn token(State(state): State<AuthorityState>, Form(form): Form<HashMap<String, String>>) -> Response {
    let code = form.get("code").cloned().unwrap_or_default();
    let redeemed = if form.get("grant_type").map(String::as_str) == Some("authorization_code") {
        state.codes.lock().remove(&code)
    } else {
        None
    };
    match redeemed {
        Some((access_token, expires_in)) => {
            let mut body = json!({
                "access_token": access_token,
                "token_type": "Bearer",
                "refresh_token": format!("refresh-{access_token}"),
            });
            if let Some(secs) = expires_in {
                body["expires_in"] = json!(secs);
            }
            Json(body).into_response()
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": "unknown code"})),
        )
            .into_response(),
    }
}

async fn introspect(State(state): State<AuthorityState>, Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    state.introspections.fetch_add(1, Ordering::SeqCst);
    let grant = form.get("token").and_then(|t| state.tokens.lock().get(t).cloned());
    match grant {
        Some(g) => Json(json!({
            "active": true,
            "sub": g.subject,
            "client_id": g.client_id,
            "exp": g.expires_at,
            "scope": g.permissions.join(" "),
        })),
        None => Json(json!({"active": false})),
    }
}

async fn permissions(State(state): State<AuthorityState>, headers: HeaderMap) -> Response {
    state.permission_lookups.fetch_add(1, Ordering::SeqCst);
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let grant = token.and_then(|t| state.tokens.lock().get(&t).cloned());
    match grant {
        Some(g) => Json(g.permissions).into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

/// The demo application wired to `authority`, served on an ephemeral port.
pub struct TestApp {
    pub base: String,
    pub client: reqwest::Client,
    handle: JoinHandle<()>,
}

impl TestApp {
    pub async fn spawn(authority: &MockAuthority) -> anyhow::Result<Self> {
        Self::spawn_with_store(authority, None).await
    }

    /// Serve the demo app with `store` instead of the configured cookie store.
    pub async fn spawn_with_store(authority: &MockAuthority, store: Option<Arc<dyn SessionStore>>) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let base = format!("http://{addr}");
        let config = test_config(&authority.base, &format!("{base}/callback"));

        let store: Arc<dyn SessionStore> = match store {
            Some(store) => store,
            None => Arc::new(CookieSessionStore::new(config.cookie_key()?, config.cookie_secure())),
        };
        let verifier = Arc::new(HttpTokenVerifier::new(&config.oauth)?);
        let manager = Arc::new(AuthSessionManager::new(&config, store, verifier)?);
        let app = sessiongate::server::app(manager, &config)?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("test app error: {e}");
            }
        });

        let client = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build()?;
        Ok(Self { base, client, handle })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// `name=value` of the session cookie set by `response`, if any.
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_string())
        .find(|pair| pair.starts_with(&format!("{SESSION}=")))
}

/// Store that never manages to write an artifact.
pub struct FailingStore;

impl SessionStore for FailingStore {
    fn load(&self, _headers: &HeaderMap, _name: &str) -> anyhow::Result<Option<SessionRecord>> {
        Ok(None)
    }

    fn save(&self, _headers: &HeaderMap, _name: &str, _record: &SessionRecord, _response: &mut HeaderMap) -> anyhow::Result<()> {
        anyhow::bail!("session backend unavailable")
    }

    fn expire(&self, _headers: &HeaderMap, _name: &str, _response: &mut HeaderMap) -> anyhow::Result<()> {
        Ok(())
    }
}
