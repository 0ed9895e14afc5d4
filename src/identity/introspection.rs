//! `TokenVerifier` backed by an OAuth authority over HTTP.
//!
//! - Introspection follows RFC 7662: form POST of `token`, client credentials as
//!   basic auth, inactive tokens rejected.
//! - Permissions come from `permissions_url` (GET with the token as bearer, JSON array
//!   of strings in the body) or, without that endpoint, from the `scope` claim.

use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::token::Token;
use super::verifier::{Introspection, TokenVerifier};
use crate::config::OAuthConfig;
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// String or array of strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

impl IntrospectionResponse {
    fn into_introspection(self) -> anyhow::Result<Introspection> {
        if !self.active {
            bail!("token is not active");
        }
        let subject = self.sub.filter(|s| !s.is_empty()).ok_or_else(|| anyhow!("introspection response has no subject"))?;
        let audience = self
            .client_id
            .or_else(|| match self.aud {
                Some(Value::String(s)) => Some(s),
                Some(Value::Array(items)) => items.into_iter().find_map(|v| v.as_str().map(str::to_string)),
                _ => None,
            })
            .ok_or_else(|| anyhow!("introspection response has no client_id or aud"))?;
        let mut extra = self.additional;
        if let Some(scope) = self.scope {
            extra.insert("scope".into(), Value::String(scope));
        }
        Ok(Introspection { subject, audience, expires_at: self.exp, extra })
    }
}

pub struct HttpTokenVerifier {
    http: reqwest::Client,
    introspection_url: String,
    permissions_url: Option<String>,
    client_id: String,
    client_secret: String,
}

impl HttpTokenVerifier {
    pub fn new(config: &OAuthConfig) -> AuthResult<Self> {
        let introspection_url = config
            .introspection_url
            .clone()
            .ok_or_else(|| AuthError::Config("oauth.introspection_url is required for the HTTP verifier".into()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            http,
            introspection_url,
            permissions_url: config.permissions_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }
}

/// Permissions carried in a space-delimited `scope` claim.
pub fn permissions_from_scope(token: &Token) -> Vec<String> {
    token
        .extra("scope")
        .and_then(|v| v.as_str())
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn introspect_token(&self, access_token: &str) -> anyhow::Result<Introspection> {
        let response = self
            .http
            .post(&self.introspection_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", access_token), ("token_type_hint", "access_token")])
            .send()
            .await
            .context("token introspection request failed")?;
        if !response.status().is_success() {
            bail!("token introspection failed with status {}", response.status());
        }
        let body: IntrospectionResponse = response.json().await.context("parsing introspection response")?;
        let introspection = body.into_introspection()?;
        tracing::debug!(subject = %introspection.subject, audience = %introspection.audience, "token introspected");
        Ok(introspection)
    }

    async fn get_permissions(&self, subject: &str, audience: &str, token: &Token) -> anyhow::Result<Vec<String>> {
        let Some(url) = &self.permissions_url else {
            return Ok(permissions_from_scope(token));
        };
        let response = self
            .http
            .get(url)
            .bearer_auth(&token.access_token)
            .query(&[("subject", subject), ("audience", audience)])
            .send()
            .await
            .context("permission lookup request failed")?;
        if !response.status().is_success() {
            bail!("permission lookup failed with status {}", response.status());
        }
        let permissions: Vec<String> = response.json().await.context("parsing permission list")?;
        tracing::debug!(subject, audience, count = permissions.len(), "permissions fetched");
        Ok(permissions)
    }
}
