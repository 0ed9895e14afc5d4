//!
//! sessiongate HTTP surface
//! ------------------------
//! Axum building blocks for protecting routes with the session manager, plus a small
//! demo server wiring them together.
//!
//! Responsibilities:
//! - `secured` middleware: redirect unauthenticated requests into the OAuth flow.
//! - `require_permission` middleware: 403 unless a permission is held.
//! - OAuth callback and logout routes (`auth_routes`).
//! - `run`: demo server with public, secured and permission-gated routes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use crate::config::AuthConfig;
use crate::error::AuthResult;
use crate::identity::HttpTokenVerifier;
use crate::manager::AuthSessionManager;
use crate::store::CookieSessionStore;

pub mod middleware;
pub mod callback;

pub use callback::{callback, CallbackParams};
pub use middleware::{require_permission, secured};

/// Callback and logout routes at the paths named in `config`.
pub fn auth_routes<S>(manager: Arc<AuthSessionManager>, config: &AuthConfig) -> AuthResult<Router<S>>
where
    S: Clone + Send + Sync + 'static,
{
    let callback_path = config.callback_path()?;
    let logout = manager.expire_session(config.logout_redirect.clone());
    Ok(Router::new()
        .route(&callback_path, get(callback))
        .route(&config.logout_path, logout)
        .with_state(manager))
}

/// Demo application: `/` is public, `/me` and `/permissions` need a session,
/// `/admin` additionally needs the `admin` permission.
pub fn app(manager: Arc<AuthSessionManager>, config: &AuthConfig) -> AuthResult<Router> {
    let admin = Router::new()
        .route("/admin", get(|| async { Json(json!({"status": "ok", "area": "admin"})) }))
        .layer(from_fn_with_state(manager.permission_guard("admin"), require_permission));

    let protected = Router::new()
        .route("/me", get(me))
        .route("/permissions", get(permissions))
        .with_state(manager.clone())
        .merge(admin)
        .layer(from_fn_with_state(manager.clone(), secured));

    Ok(Router::new()
        .route("/", get(|| async { "sessiongate ok" }))
        .merge(protected)
        .merge(auth_routes(manager, config)?))
}

async fn me(State(manager): State<Arc<AuthSessionManager>>, headers: HeaderMap) -> Response {
    match manager.get_session_data(&headers).await {
        Ok(identity) => Json(json!({
            "status": "ok",
            "subject": identity.subject(),
            "audience": identity.audience(),
            "token_type": identity.token().token_type,
            "expires_at": identity.token().expiry,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn permissions(State(manager): State<Arc<AuthSessionManager>>, headers: HeaderMap) -> Response {
    let mut issued = HeaderMap::new();
    match manager.get_permissions(&headers, &mut issued).await {
        Ok(perms) => (issued, Json(json!({"status": "ok", "permissions": perms}))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Start the demo server on `port` with a cookie-backed store and the HTTP verifier.
pub async fn run(config: AuthConfig, port: u16) -> anyhow::Result<()> {
    let store = Arc::new(CookieSessionStore::new(config.cookie_key()?, config.cookie_secure()));
    let verifier = Arc::new(HttpTokenVerifier::new(&config.oauth)?);
    let manager = Arc::new(AuthSessionManager::new(&config, store, verifier)?);
    let app = app(manager, &config)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    info!(%addr, client_id = %config.oauth.client_id, session = %config.session_name, "starting sessiongate");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
