use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use base64::Engine;
use parking_lot::RwLock;

use super::{append_set_cookie, parse_cookie, removal_cookie, session_cookie, SessionStore};
use crate::identity::SessionRecord;

fn gen_id() -> anyhow::Result<String> {
    // 256-bit random id, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow::anyhow!("session id generation failed: {e}"))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Server-side store: records live in process memory, the cookie only carries an opaque id.
///
/// A save for the credential already held under the request's id (or under any live id)
/// overwrites that record in place. A different credential gets a fresh id and the
/// request's previous record is dropped. Records with an expired token are purged on
/// every save and whenever one is loaded.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<RwLock<Records>>,
    secure: bool,
}

#[derive(Default)]
struct Records {
    by_id: HashMap<String, SessionRecord>,
    // access token -> session id
    by_token: HashMap<String, String>,
}

impl Records {
    fn put(&mut self, id: String, record: SessionRecord) {
        if let Some(previous) = self.by_id.insert(id.clone(), record.clone()) {
            if previous.access_token() != record.access_token() {
                self.by_token.remove(previous.access_token());
            }
        }
        self.by_token.insert(record.access_token().to_string(), id);
    }

    fn remove(&mut self, id: &str) -> Option<SessionRecord> {
        let record = self.by_id.remove(id)?;
        if self.by_token.get(record.access_token()).map(String::as_str) == Some(id) {
            self.by_token.remove(record.access_token());
        }
        Some(record)
    }

    fn purge_expired(&mut self) -> usize {
        let expired: Vec<String> = self
            .by_id
            .iter()
            .filter(|(_, r)| r.is_token_expired())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.remove(id);
        }
        expired.len()
    }
}

impl MemorySessionStore {
    pub fn new(secure: bool) -> Self {
        Self { inner: Arc::new(RwLock::new(Records::default())), secure }
    }

    /// Store a record directly and return its session id.
    pub fn insert(&self, record: SessionRecord) -> anyhow::Result<String> {
        let id = gen_id()?;
        self.inner.write().put(id.clone(), record);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<SessionRecord> {
        self.inner.read().by_id.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_id.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, headers: &HeaderMap, name: &str) -> anyhow::Result<Option<SessionRecord>> {
        let Some(id) = parse_cookie(headers, name) else { return Ok(None); };
        let record = self.get(&id);
        match record {
            Some(r) if r.is_token_expired() => {
                self.inner.write().remove(&id);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn save(&self, headers: &HeaderMap, name: &str, record: &SessionRecord, response: &mut HeaderMap) -> anyhow::Result<()> {
        let current = parse_cookie(headers, name);
        let id = {
            let mut records = self.inner.write();
            let purged = records.purge_expired();
            if purged > 0 {
                tracing::debug!(session = name, purged, "dropped expired session records");
            }
            let same_credential = current
                .as_deref()
                .filter(|id| records.by_id.get(*id).is_some_and(|r| r.access_token() == record.access_token()))
                .map(str::to_string)
                .or_else(|| records.by_token.get(record.access_token()).cloned());
            let id = match same_credential {
                Some(id) => id,
                None => {
                    if let Some(old) = current.as_deref() {
                        records.remove(old);
                    }
                    gen_id()?
                }
            };
            records.put(id.clone(), record.clone());
            id
        };
        append_set_cookie(response, &session_cookie(name, id, self.secure))
    }

    fn expire(&self, headers: &HeaderMap, name: &str, response: &mut HeaderMap) -> anyhow::Result<()> {
        if let Some(id) = parse_cookie(headers, name) {
            self.inner.write().remove(&id);
        }
        append_set_cookie(response, &removal_cookie(name, self.secure))
    }
}
