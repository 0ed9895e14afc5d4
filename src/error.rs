//! Error model shared by the session manager, the artifact stores and the HTTP surface.
//! Authorization checks collapse these to "not authorized"; the callback and the
//! explicit data accessors surface them with the status mapping below.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable credential, or the credential's token has expired.
    #[error("invalid session")]
    InvalidSession,

    #[error("invalid authorization header format")]
    InvalidAuthorizationHeaderFormat,

    #[error("unsupported authorization type")]
    UnsupportedAuthorizationType,

    /// The credential was issued for a different client.
    #[error("invalid audience (client id)")]
    InvalidAudience,

    /// Reserved for subject-binding checks.
    #[error("invalid subject (user id)")]
    InvalidSubject,

    /// Introspection or permission lookup failed.
    #[error(transparent)]
    Verifier(anyhow::Error),

    /// The session artifact could not be written or expired.
    #[error(transparent)]
    Store(anyhow::Error),

    #[error("code exchange failed: {0}")]
    Exchange(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AuthError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AuthError::InvalidSession => "invalid_session",
            AuthError::InvalidAuthorizationHeaderFormat => "invalid_authorization_header_format",
            AuthError::UnsupportedAuthorizationType => "unsupported_authorization_type",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::InvalidSubject => "invalid_subject",
            AuthError::Verifier(_) => "verifier_error",
            AuthError::Store(_) => "store_error",
            AuthError::Exchange(_) => "exchange_failed",
            AuthError::Config(_) => "invalid_config",
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        match self {
            AuthError::InvalidSession
            | AuthError::InvalidAuthorizationHeaderFormat
            | AuthError::UnsupportedAuthorizationType
            | AuthError::InvalidAudience
            | AuthError::InvalidSubject => StatusCode::UNAUTHORIZED,
            AuthError::Exchange(_) => StatusCode::BAD_REQUEST,
            AuthError::Verifier(_) => StatusCode::BAD_GATEWAY,
            AuthError::Store(_) | AuthError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for failures raised by an injected collaborator rather than by the checks here.
    pub fn is_collaborator(&self) -> bool {
        matches!(self, AuthError::Verifier(_) | AuthError::Store(_))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({"status": "error", "code": self.code_str(), "error": self.to_string()});
        (self.http_status(), axum::Json(body)).into_response()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
