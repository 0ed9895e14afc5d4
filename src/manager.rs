//! Auth session manager: reconciles the session artifact and bearer credentials of a
//! request against the authority, keeps the permission cache fresh, and re-issues the
//! artifact when its contents change.
//!
//! Every request-scoped operation takes the request headers. Operations that may issue
//! an artifact also take the response header map that receives the `Set-Cookie` values;
//! callers append it to whatever response they send.
//!
//! The manager holds no per-request state. Concurrent requests for the same session
//! may each refresh permissions; the last artifact written wins.

use std::sync::Arc;

use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, MethodRouter};
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::identity::{extract_credential, AuthenticatedIdentity, Credential, SessionRecord, Token, TokenVerifier};
use crate::oauth::OAuthClient;
use crate::store::SessionStore;

pub struct AuthSessionManager {
    name: String,
    client_id: String,
    session_ttl: chrono::Duration,
    permission_ttl: chrono::Duration,
    store: Arc<dyn SessionStore>,
    verifier: Arc<dyn TokenVerifier>,
    oauth: OAuthClient,
}

impl AuthSessionManager {
    pub fn new(config: &AuthConfig, store: Arc<dyn SessionStore>, verifier: Arc<dyn TokenVerifier>) -> AuthResult<Self> {
        let oauth = OAuthClient::new(&config.oauth, config.callback_url.clone())?;
        Ok(Self {
            name: config.session_name.clone(),
            client_id: config.oauth.client_id.clone(),
            session_ttl: config.session_ttl(),
            permission_ttl: config.permission_ttl(),
            store,
            verifier,
            oauth,
        })
    }

    pub fn session_name(&self) -> &str { &self.name }
    pub fn client_id(&self) -> &str { &self.client_id }
    pub fn oauth(&self) -> &OAuthClient { &self.oauth }

    /// Fresh record for a newly obtained token, bounded by the session TTL.
    pub fn new_record(&self, token: Token) -> SessionRecord {
        SessionRecord::new(token, self.session_ttl)
    }

    /// Extract, introspect and bind the request's credential to this client.
    /// Returns the identity and whether the credential came from the header.
    async fn reconcile(&self, headers: &HeaderMap) -> AuthResult<(AuthenticatedIdentity, bool)> {
        let credential = extract_credential(self.store.as_ref(), &self.name, headers)?;
        let introspection = self
            .verifier
            .introspect_token(credential.access_token())
            .await
            .map_err(AuthError::Verifier)?;

        let from_header = credential.is_from_header();
        let source = credential.source();
        let record = match credential {
            Credential::Stored(record) => record,
            Credential::Bearer(access_token) => {
                let token = Token::bearer(access_token, introspection.expires_at).with_extra(introspection.extra);
                self.new_record(token)
            }
        };

        let identity = AuthenticatedIdentity::new(introspection.subject, introspection.audience, record);
        if identity.audience() != self.client_id {
            warn!(subject = %identity.subject(), audience = %identity.audience(), expected = %self.client_id, "credential issued for another client");
            return Err(AuthError::InvalidAudience);
        }
        debug!(subject = %identity.subject(), source, "credential reconciled");
        Ok((identity, from_header))
    }

    /// Reconciled, unexpired identity of the request. A header credential is promoted
    /// to a session artifact on success.
    pub async fn authenticate(&self, headers: &HeaderMap, response: &mut HeaderMap) -> AuthResult<AuthenticatedIdentity> {
        let (identity, from_header) = self.reconcile(headers).await?;
        if identity.is_token_expired() {
            debug!(subject = %identity.subject(), "token expired");
            return Err(AuthError::InvalidSession);
        }
        if from_header {
            self.persist(headers, identity.record(), response)?;
        }
        Ok(identity)
    }

    /// Whether the request carries a valid identity for this client.
    pub async fn authorize(&self, headers: &HeaderMap, response: &mut HeaderMap) -> bool {
        match self.authenticate(headers, response).await {
            Ok(_) => true,
            Err(e) => {
                log_denied(&e, "authorization failed");
                false
            }
        }
    }

    /// Exact-match permission check. Fails closed on any error.
    pub async fn has_permission(&self, headers: &HeaderMap, response: &mut HeaderMap, permission: &str) -> bool {
        match self.get_permissions(headers, response).await {
            Ok(perms) => perms.binary_search_by(|p| p.as_str().cmp(permission)).is_ok(),
            Err(e) => {
                log_denied(&e, "permission check failed");
                false
            }
        }
    }

    /// Permission check for an identity already reconciled earlier in the same request.
    /// Only a permission refresh is persisted.
    pub async fn identity_has_permission(
        &self,
        identity: &mut AuthenticatedIdentity,
        headers: &HeaderMap,
        response: &mut HeaderMap,
        permission: &str,
    ) -> bool {
        if identity.is_token_expired() {
            return false;
        }
        let refreshed = match self.ensure_permissions(identity).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                log_denied(&e, "permission check failed");
                return false;
            }
        };
        if refreshed {
            if let Err(e) = self.persist(headers, identity.record(), response) {
                log_denied(&e, "could not persist refreshed permissions");
                return false;
            }
        }
        identity.record().has_permission(permission)
    }

    /// Sorted permission set of the request's identity, refreshed from the authority
    /// once the cache window has passed.
    pub async fn get_permissions(&self, headers: &HeaderMap, response: &mut HeaderMap) -> AuthResult<Vec<String>> {
        let (mut identity, from_header) = self.reconcile(headers).await?;
        if identity.is_token_expired() {
            return Err(AuthError::InvalidSession);
        }
        let refreshed = self.ensure_permissions(&mut identity).await?;
        if from_header || refreshed {
            self.persist(headers, identity.record(), response)?;
        }
        Ok(identity.into_record().permissions)
    }

    async fn ensure_permissions(&self, identity: &mut AuthenticatedIdentity) -> AuthResult<bool> {
        if !identity.record().is_permissions_expired() {
            return Ok(false);
        }
        let permissions = self
            .verifier
            .get_permissions(identity.subject(), identity.audience(), identity.token())
            .await
            .map_err(AuthError::Verifier)?;
        debug!(subject = %identity.subject(), count = permissions.len(), "permission cache refreshed");
        identity.record_mut().replace_permissions(permissions, self.permission_ttl);
        Ok(true)
    }

    /// Identity of the request without touching the permission cache.
    pub async fn get_session_data(&self, headers: &HeaderMap) -> AuthResult<AuthenticatedIdentity> {
        let (identity, _) = self.reconcile(headers).await?;
        if identity.is_token_expired() {
            return Err(AuthError::InvalidSession);
        }
        Ok(identity)
    }

    /// Issue `record` as this request's session artifact.
    pub fn persist(&self, headers: &HeaderMap, record: &SessionRecord, response: &mut HeaderMap) -> AuthResult<()> {
        self.store.save(headers, &self.name, record, response).map_err(AuthError::Store)
    }

    /// Drop the artifact and redirect (303) to `redirect`.
    pub fn logout(&self, headers: &HeaderMap, redirect: &str) -> Response {
        let mut issued = HeaderMap::new();
        if let Err(e) = self.store.expire(headers, &self.name, &mut issued) {
            warn!(session = %self.name, error = %e, "could not expire session artifact");
        }
        (issued, Redirect::to(redirect)).into_response()
    }

    /// Logout handler for GET and POST that redirects to `redirect` afterwards.
    pub fn expire_session<S>(self: &Arc<Self>, redirect: impl Into<String>) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let manager = Arc::clone(self);
        let redirect: Arc<str> = Arc::from(redirect.into());
        let handler = move |headers: HeaderMap| async move { manager.logout(&headers, &redirect) };
        get(handler.clone()).post(handler)
    }

    /// 303 to the authority, remembering `original` as the OAuth `state`.
    pub fn start_oauth(&self, original: &Uri) -> Response {
        let state = original.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        debug!(state, "redirecting to authority");
        Redirect::to(&self.oauth.authorize_url(state)).into_response()
    }

    /// Exchange a callback code and persist the resulting token as a fresh session.
    pub async fn complete_oauth(&self, headers: &HeaderMap, code: &str, response: &mut HeaderMap) -> AuthResult<()> {
        let token = self.oauth.exchange(code).await?;
        let record = self.new_record(token);
        self.persist(headers, &record, response)
    }

    /// State for the `require_permission` middleware.
    pub fn permission_guard(self: &Arc<Self>, permission: impl Into<String>) -> PermissionGuard {
        PermissionGuard { manager: Arc::clone(self), permission: Arc::from(permission.into()) }
    }
}

fn log_denied(err: &AuthError, msg: &str) {
    if err.is_collaborator() {
        warn!(code = err.code_str(), error = %err, "{msg}");
    } else {
        debug!(code = err.code_str(), error = %err, "{msg}");
    }
}

#[derive(Clone)]
pub struct PermissionGuard {
    pub(crate) manager: Arc<AuthSessionManager>,
    pub(crate) permission: Arc<str>,
}

impl PermissionGuard {
    pub fn permission(&self) -> &str { &self.permission }
}
