use std::sync::Arc;

use axum::extract::{OriginalUri, Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::identity::AuthenticatedIdentity;
use crate::manager::{AuthSessionManager, PermissionGuard};

fn cookie_name(value: &HeaderValue) -> Option<&str> {
    value.to_str().ok()?.split_once('=').map(|(name, _)| name.trim())
}

/// Copy issued headers onto the response. A cookie the inner handler already set
/// was written later and is kept.
fn append_issued(response: &mut Response, issued: HeaderMap) {
    let headers = response.headers_mut();
    let already_set: Vec<String> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(cookie_name)
        .map(str::to_string)
        .collect();
    for (name, value) in issued.iter() {
        if *name == SET_COOKIE && cookie_name(value).is_some_and(|c| already_set.iter().any(|s| s == c)) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
}

/// Protects the routes it wraps: unauthenticated requests go to the authority (303)
/// with the original URI as `state`. The reconciled `AuthenticatedIdentity` is left in
/// the request extensions for inner handlers and `require_permission`.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/reports", get(reports))
///     .layer(axum::middleware::from_fn_with_state(manager.clone(), secured));
/// ```
pub async fn secured(State(manager): State<Arc<AuthSessionManager>>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    let mut issued = HeaderMap::new();
    match manager.authenticate(&parts.headers, &mut issued).await {
        Ok(identity) => {
            parts.extensions.insert(identity);
        }
        Err(e) => {
            tracing::debug!(code = e.code_str(), error = %e, "unauthenticated request");
            // nested routers see a stripped uri
            let original = match parts.extensions.get::<OriginalUri>() {
                Some(OriginalUri(uri)) => uri.clone(),
                None => parts.uri.clone(),
            };
            return manager.start_oauth(&original);
        }
    }
    let mut response = next.run(Request::from_parts(parts, body)).await;
    append_issued(&mut response, issued);
    response
}

/// 403 unless the request's identity holds the guard's permission. Behind `secured`
/// the identity it reconciled is reused instead of introspecting again.
pub async fn require_permission(State(guard): State<PermissionGuard>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let mut issued = HeaderMap::new();
    let permission = guard.permission();
    let reconciled = parts.extensions.get::<AuthenticatedIdentity>().cloned();
    let allowed = match reconciled {
        Some(mut identity) => {
            guard.manager.identity_has_permission(&mut identity, &parts.headers, &mut issued, permission).await
        }
        None => guard.manager.has_permission(&parts.headers, &mut issued, permission).await,
    };
    if !allowed {
        tracing::debug!(permission, "permission denied");
        let mut response = (StatusCode::FORBIDDEN, "forbidden").into_response();
        append_issued(&mut response, issued);
        return response;
    }
    let mut response = next.run(Request::from_parts(parts, body)).await;
    append_issued(&mut response, issued);
    response
}
