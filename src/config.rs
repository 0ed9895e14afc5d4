//! Deployment configuration: cookie keys, OAuth client settings and the two TTL windows.
//! Loaded from a JSON file or from `SESSIONGATE_*` environment variables.

use std::path::Path;

use anyhow::Context;
use axum_extra::extract::cookie::Key;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;
pub const DEFAULT_PERMISSION_TTL_SECS: u64 = 600;

const ENV_PREFIX: &str = "SESSIONGATE_";

/// Keys for the session cookie transport. Both values are standard base64; the
/// signing key must decode to at least 32 bytes and the encryption key to exactly 32.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    pub signing_key: String,
    pub encryption_key: String,
    #[serde(default = "default_true")]
    pub secure: bool,
}

impl CookieConfig {
    pub fn key(&self) -> AuthResult<Key> {
        let signing = decode_key("signing_key", &self.signing_key)?;
        let encryption = decode_key("encryption_key", &self.encryption_key)?;
        if signing.len() < 32 {
            return Err(AuthError::Config(format!("signing_key must be at least 32 bytes, got {}", signing.len())));
        }
        if encryption.len() != 32 {
            return Err(AuthError::Config(format!("encryption_key must be 32 bytes, got {}", encryption.len())));
        }
        let mut master = Vec::with_capacity(64);
        master.extend_from_slice(&signing[..32]);
        master.extend_from_slice(&encryption);
        Key::try_from(master.as_slice()).map_err(|e| AuthError::Config(e.to_string()))
    }
}

fn decode_key(field: &str, value: &str) -> AuthResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|e| AuthError::Config(format!("{field} is not valid base64: {e}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    /// RFC 7662 endpoint used by the bundled HTTP verifier.
    #[serde(default)]
    pub introspection_url: Option<String>,
    /// Endpoint returning a JSON array of permissions for the bearer of a token.
    #[serde(default)]
    pub permissions_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Cookie name under which the session artifact is stored.
    #[serde(default = "AuthConfig::default_session_name")]
    pub session_name: String,
    /// When absent, random keys are generated at startup.
    #[serde(default)]
    pub cookie: Option<CookieConfig>,
    pub oauth: OAuthConfig,
    /// Absolute URL registered with the authority as redirect target.
    pub callback_url: String,
    #[serde(default = "AuthConfig::default_logout_path")]
    pub logout_path: String,
    #[serde(default = "AuthConfig::default_logout_redirect")]
    pub logout_redirect: String,
    #[serde(default = "AuthConfig::default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "AuthConfig::default_permission_ttl_secs")]
    pub permission_ttl_secs: u64,
}

fn default_true() -> bool { true }

impl AuthConfig {
    fn default_session_name() -> String { "sessiongate".to_string() }
    fn default_logout_path() -> String { "/logout".to_string() }
    fn default_logout_redirect() -> String { "/".to_string() }
    fn default_session_ttl_secs() -> u64 { DEFAULT_SESSION_TTL_SECS }
    fn default_permission_ttl_secs() -> u64 { DEFAULT_PERMISSION_TTL_SECS }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary variable source. Keys are the `SESSIONGATE_*` names
    /// (`CLIENT_ID`, `CLIENT_SECRET`, `AUTH_URL`, `TOKEN_URL`, `CALLBACK_URL`, ...).
    pub fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty());
        let required = |name: &str| get(name).ok_or_else(|| AuthError::Config(format!("{ENV_PREFIX}{name} is not set")));
        let secs = |name: &str, default: u64| -> AuthResult<u64> {
            match get(name) {
                Some(v) => v.trim().parse::<u64>().map_err(|e| AuthError::Config(format!("{ENV_PREFIX}{name}: {e}"))),
                None => Ok(default),
            }
        };

        let secure = match get("COOKIE_SECURE") {
            Some(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"),
            None => true,
        };
        let cookie = match (get("SIGNING_KEY"), get("ENCRYPTION_KEY")) {
            (Some(signing_key), Some(encryption_key)) => Some(CookieConfig { signing_key, encryption_key, secure }),
            (None, None) => None,
            _ => return Err(AuthError::Config("SIGNING_KEY and ENCRYPTION_KEY must be set together".into())),
        };
        let scopes = get("SCOPES")
            .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        Ok(Self {
            session_name: get("SESSION_NAME").unwrap_or_else(Self::default_session_name),
            cookie,
            oauth: OAuthConfig {
                client_id: required("CLIENT_ID")?,
                client_secret: required("CLIENT_SECRET")?,
                scopes,
                auth_url: required("AUTH_URL")?,
                token_url: required("TOKEN_URL")?,
                introspection_url: get("INTROSPECTION_URL"),
                permissions_url: get("PERMISSIONS_URL"),
            },
            callback_url: required("CALLBACK_URL")?,
            logout_path: get("LOGOUT_PATH").unwrap_or_else(Self::default_logout_path),
            logout_redirect: get("LOGOUT_REDIRECT").unwrap_or_else(Self::default_logout_redirect),
            session_ttl_secs: secs("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?,
            permission_ttl_secs: secs("PERMISSION_TTL_SECS", DEFAULT_PERMISSION_TTL_SECS)?,
        })
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs.min(i64::MAX as u64) as i64)
    }

    pub fn permission_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.permission_ttl_secs.min(i64::MAX as u64) as i64)
    }

    pub fn cookie_secure(&self) -> bool {
        self.cookie.as_ref().map(|c| c.secure).unwrap_or(true)
    }

    /// Transport key for the session cookie; random when no keys are configured.
    pub fn cookie_key(&self) -> AuthResult<Key> {
        match &self.cookie {
            Some(c) => c.key(),
            None => {
                tracing::warn!(session = %self.session_name, "no cookie keys configured; generating random keys, sessions will not survive a restart");
                let mut buf = [0u8; 64];
                getrandom::getrandom(&mut buf).map_err(|e| AuthError::Config(e.to_string()))?;
                Key::try_from(&buf[..]).map_err(|e| AuthError::Config(e.to_string()))
            }
        }
    }

    /// Path component of `callback_url`, used to mount the callback route.
    pub fn callback_path(&self) -> AuthResult<String> {
        if self.callback_url.starts_with('/') {
            return Ok(self.callback_url.clone());
        }
        let url = url::Url::parse(&self.callback_url)
            .map_err(|e| AuthError::Config(format!("callback_url: {e}")))?;
        Ok(url.path().to_string())
    }
}
