use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::token::Token;

/// Payload of the persisted session artifact.
///
/// `permissions` is kept sorted and free of duplicates so membership is a binary search.
/// `permissions_expire_at == None` means the cache was never populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: Token,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub permissions_expire_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Wrap a freshly obtained token. A token without expiry is bounded by `session_ttl`.
    pub fn new(mut token: Token, session_ttl: Duration) -> Self {
        if token.expiry.is_none() {
            token.expiry = Some(Utc::now() + session_ttl);
        }
        Self { token, permissions: Vec::new(), permissions_expire_at: None }
    }

    pub fn access_token(&self) -> &str {
        &self.token.access_token
    }

    pub fn is_token_expired(&self) -> bool {
        self.token.is_expired_at(Utc::now())
    }

    pub fn is_permissions_expired(&self) -> bool {
        self.is_permissions_expired_at(Utc::now())
    }

    pub fn is_permissions_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.permissions_expire_at {
            Some(at) => at < now,
            None => true,
        }
    }

    /// Overwrite the cached permission set and start a new cache window.
    pub fn replace_permissions(&mut self, mut permissions: Vec<String>, ttl: Duration) {
        permissions.sort_unstable();
        permissions.dedup();
        self.permissions = permissions;
        self.permissions_expire_at = Some(Utc::now() + ttl);
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.binary_search_by(|p| p.as_str().cmp(permission)).is_ok()
    }
}

/// Request-scoped identity: who introspection says the credential belongs to, plus the
/// session record it was reconciled with. Never persisted as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedIdentity {
    subject: String,
    audience: String,
    record: SessionRecord,
}

impl AuthenticatedIdentity {
    pub fn new(subject: impl Into<String>, audience: impl Into<String>, record: SessionRecord) -> Self {
        Self { subject: subject.into(), audience: audience.into(), record }
    }

    pub fn subject(&self) -> &str { &self.subject }
    pub fn audience(&self) -> &str { &self.audience }
    pub fn record(&self) -> &SessionRecord { &self.record }
    pub fn record_mut(&mut self) -> &mut SessionRecord { &mut self.record }
    pub fn into_record(self) -> SessionRecord { self.record }
    pub fn token(&self) -> &Token { &self.record.token }
    pub fn permissions(&self) -> &[String] { &self.record.permissions }

    pub fn is_token_expired(&self) -> bool {
        self.record.is_token_expired()
    }
}
