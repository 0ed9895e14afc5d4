use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const BEARER: &str = "bearer";

/// An OAuth access credential as held in a session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// `None` only until the token is wrapped in a `SessionRecord`.
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Token {
    pub fn new(token_type: impl Into<String>, access_token: impl Into<String>, expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            refresh_token: None,
            expiry,
            extra: Map::new(),
        }
    }

    /// Bearer token with an expiry in unix seconds, as reported by introspection.
    pub fn bearer(access_token: impl Into<String>, expires_at: Option<i64>) -> Self {
        let expiry = expires_at.and_then(|secs| DateTime::from_timestamp(secs, 0));
        Self::new(BEARER, access_token, expiry)
    }

    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// A token without expiry counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry < now,
            None => true,
        }
    }
}
