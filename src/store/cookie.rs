use anyhow::Context;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{Key, PrivateCookieJar};

use super::{append_set_cookie, removal_cookie, session_cookie, SessionStore};
use crate::identity::SessionRecord;

/// Client-side store: the record travels JSON-encoded inside an encrypted,
/// authenticated cookie. Nothing is kept on the server.
#[derive(Clone)]
pub struct CookieSessionStore {
    key: Key,
    secure: bool,
}

impl CookieSessionStore {
    pub fn new(key: Key, secure: bool) -> Self {
        Self { key, secure }
    }
}

impl SessionStore for CookieSessionStore {
    fn load(&self, headers: &HeaderMap, name: &str) -> anyhow::Result<Option<SessionRecord>> {
        // cookies that fail to decrypt are dropped by the jar
        let jar: PrivateCookieJar = PrivateCookieJar::from_headers(headers, self.key.clone());
        let Some(cookie) = jar.get(name) else { return Ok(None); };
        let record = serde_json::from_str(cookie.value()).context("decoding session cookie payload")?;
        Ok(Some(record))
    }

    fn save(&self, _headers: &HeaderMap, name: &str, record: &SessionRecord, response: &mut HeaderMap) -> anyhow::Result<()> {
        let payload = serde_json::to_string(record).context("encoding session record")?;
        let jar: PrivateCookieJar = PrivateCookieJar::new(self.key.clone());
        let jar = jar.add(session_cookie(name, payload, self.secure));
        let sealed = jar.into_response();
        for value in sealed.headers().get_all(SET_COOKIE) {
            if value.len() > 4096 {
                tracing::warn!(cookie = name, bytes = value.len(), "session cookie exceeds 4KiB; browsers may drop it");
            }
            response.append(SET_COOKIE, value.clone());
        }
        Ok(())
    }

    fn expire(&self, _headers: &HeaderMap, name: &str, response: &mut HeaderMap) -> anyhow::Result<()> {
        append_set_cookie(response, &removal_cookie(name, self.secure))
    }
}
