//! Session artifact stores. The manager only needs to load a record for a request,
//! write a fresh one onto a response, and force the artifact to expire.

mod cookie;
mod memory;

pub use cookie::CookieSessionStore;
pub use memory::MemorySessionStore;

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::identity::SessionRecord;

pub trait SessionStore: Send + Sync {
    /// Record associated with the request, if any.
    fn load(&self, headers: &HeaderMap, name: &str) -> anyhow::Result<Option<SessionRecord>>;

    /// Issue `record` as a new artifact. `response` receives the `Set-Cookie` values.
    fn save(&self, headers: &HeaderMap, name: &str, record: &SessionRecord, response: &mut HeaderMap) -> anyhow::Result<()>;

    /// Delete the artifact and make the client drop its cookie immediately.
    fn expire(&self, headers: &HeaderMap, name: &str, response: &mut HeaderMap) -> anyhow::Result<()>;
}

/// Raw value of a request cookie, searching every `Cookie` header.
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(COOKIE) {
        let Ok(s) = cookie.to_str() else { continue; };
        for part in s.split(';') {
            let p = part.trim();
            if let Some(eq) = p.find('=') {
                let (k, v) = p.split_at(eq);
                if k == name { return Some(v[1..].to_string()); }
            }
        }
    }
    None
}

pub(crate) fn session_cookie(name: &str, value: String, secure: bool) -> Cookie<'static> {
    // Lax: the OAuth callback arrives as a cross-site navigation
    Cookie::build((name.to_string(), value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Empty, already-expired cookie for `name` (Max-Age=0 plus a past Expires).
pub(crate) fn removal_cookie(name: &str, secure: bool) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new(), secure);
    cookie.make_removal();
    cookie
}

pub(crate) fn append_set_cookie(response: &mut HeaderMap, cookie: &Cookie<'_>) -> anyhow::Result<()> {
    let value = HeaderValue::from_str(&cookie.to_string())?;
    response.append(SET_COOKIE, value);
    Ok(())
}
