use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use super::session::SessionRecord;
use crate::error::{AuthError, AuthResult};
use crate::store::SessionStore;

/// Where the raw access value of a request came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Credential {
    /// A live session artifact; its token is re-used without a new record.
    Stored(SessionRecord),
    /// An `Authorization: Bearer` value. Always re-validated.
    Bearer(String),
}

impl Credential {
    pub fn access_token(&self) -> &str {
        match self {
            Credential::Stored(record) => record.access_token(),
            Credential::Bearer(token) => token,
        }
    }

    pub fn is_from_header(&self) -> bool {
        matches!(self, Credential::Bearer(_))
    }

    pub fn source(&self) -> &'static str {
        match self {
            Credential::Stored(_) => "session",
            Credential::Bearer(_) => "header",
        }
    }
}

/// Prefer a stored, unexpired session record; otherwise fall back to the bearer header.
pub fn extract_credential(store: &dyn SessionStore, name: &str, headers: &HeaderMap) -> AuthResult<Credential> {
    match store.load(headers, name) {
        Ok(Some(record)) if !record.is_token_expired() => return Ok(Credential::Stored(record)),
        Ok(Some(_)) => tracing::debug!(session = name, "stored session token expired"),
        Ok(None) => {}
        Err(e) => tracing::debug!(session = name, error = %e, "ignoring undecodable session artifact"),
    }
    bearer_token(headers).map(Credential::Bearer)
}

/// Parse `Authorization: Bearer <token>`. The scheme is matched case-insensitively and
/// the value must be exactly two whitespace-separated fields.
pub fn bearer_token(headers: &HeaderMap) -> AuthResult<String> {
    let Some(value) = headers.get(AUTHORIZATION) else { return Err(AuthError::InvalidSession); };
    let value = value.to_str().map_err(|_| AuthError::InvalidAuthorizationHeaderFormat)?;
    let mut fields = value.split_whitespace();
    let (Some(scheme), Some(token), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(AuthError::InvalidAuthorizationHeaderFormat);
    };
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::UnsupportedAuthorizationType);
    }
    Ok(token.to_string())
}
