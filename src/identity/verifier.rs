use async_trait::async_trait;
use serde_json::{Map, Value};

use super::token::Token;

/// Result of resolving a raw access value against the authority.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Introspection {
    pub subject: String,
    /// Client id the credential was issued for.
    pub audience: String,
    /// Unix seconds; `None` when the authority does not report one.
    pub expires_at: Option<i64>,
    pub extra: Map<String, Value>,
}

/// The two authority calls the session manager depends on. Errors are passed
/// through to callers untouched.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn introspect_token(&self, access_token: &str) -> anyhow::Result<Introspection>;

    async fn get_permissions(&self, subject: &str, audience: &str, token: &Token) -> anyhow::Result<Vec<String>>;
}
