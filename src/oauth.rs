//! Authorization-code client: builds the redirect to the authority and exchanges the
//! returned code for a token at the token endpoint.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::config::OAuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::identity::Token;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn default_token_type() -> String { "Bearer".to_string() }

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    auth_url: Url,
    token_url: Url,
    redirect_url: String,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: &OAuthConfig, redirect_url: impl Into<String>) -> AuthResult<Self> {
        let auth_url = Url::parse(&config.auth_url).map_err(|e| AuthError::Config(format!("oauth.auth_url: {e}")))?;
        let token_url = Url::parse(&config.token_url).map_err(|e| AuthError::Config(format!("oauth.token_url: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scopes: config.scopes.clone(),
            auth_url,
            token_url,
            redirect_url: redirect_url.into(),
            http,
        })
    }

    /// Authorization endpoint URL carrying `state` back to the callback untouched.
    pub fn authorize_url(&self, state: &str) -> String {
        let mut url = self.auth_url.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("response_type", "code");
            q.append_pair("client_id", &self.client_id);
            q.append_pair("redirect_uri", &self.redirect_url);
            if !self.scopes.is_empty() {
                q.append_pair("scope", &self.scopes.join(" "));
            }
            q.append_pair("state", state);
        }
        url.into()
    }

    /// Exchange an authorization code for a token. Any failure is an `Exchange` error
    /// carrying the authority's explanation when it gave one.
    pub async fn exchange(&self, code: &str) -> AuthResult<Token> {
        let response = self
            .http
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_url.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Exchange(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| AuthError::Exchange(format!("reading token response: {e}")))?;
        if !status.is_success() {
            let detail = match serde_json::from_slice::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                },
                Err(_) => format!("token endpoint returned {status}"),
            };
            return Err(AuthError::Exchange(detail));
        }

        let parsed: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| AuthError::Exchange(format!("invalid token response: {e}")))?;
        let expiry = parsed
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        Ok(Token {
            access_token: parsed.access_token,
            token_type: parsed.token_type,
            refresh_token: parsed.refresh_token,
            expiry,
            extra: parsed.extra,
        })
    }
}
