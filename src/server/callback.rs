use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::AuthError;
use crate::manager::AuthSessionManager;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Only same-origin paths are followed; `//host` and absolute URLs are not.
fn redirect_target(state: Option<&str>) -> &str {
    match state {
        Some(s) if s.starts_with('/') && !s.starts_with("//") && !s.starts_with("/\\") => s,
        _ => "/",
    }
}

/// Redirect target of the authority. Exchanges `code`, stores the new session and
/// sends the browser back to `state`.
pub async fn callback(
    State(manager): State<Arc<AuthSessionManager>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        let detail = match params.error.as_deref() {
            Some(err) => format!("authorization failed: {err}"),
            None => "missing authorization code".to_string(),
        };
        warn!(detail = %detail, "callback without code");
        return (StatusCode::BAD_REQUEST, detail).into_response();
    };

    let mut issued = HeaderMap::new();
    match manager.complete_oauth(&headers, code, &mut issued).await {
        Ok(()) => {}
        Err(e @ AuthError::Exchange(_)) => {
            warn!(error = %e, "code exchange failed");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
        Err(e) => {
            error!(error = %e, "could not store session after code exchange");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    }

    let target = redirect_target(params.state.as_deref());
    info!(target_path = %target, "session established");
    (issued, Redirect::to(target)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_target_accepts_local_paths_only() {
        assert_eq!(redirect_target(Some("/reports?page=2")), "/reports?page=2");
        assert_eq!(redirect_target(Some("/")), "/");
        assert_eq!(redirect_target(Some("//evil.example.com/x")), "/");
        assert_eq!(redirect_target(Some("/\\evil.example.com")), "/");
        assert_eq!(redirect_target(Some("https://evil.example.com")), "/");
        assert_eq!(redirect_target(Some("")), "/");
        assert_eq!(redirect_target(None), "/");
    }
}
