//! One-shot status messages carried across the redirect-after-POST.
//!
//! The message lives server-side, keyed by a session id from an HttpOnly
//! cookie, and is consumed by an explicit take: read once, then gone.

use std::collections::HashMap;

use axum_extra::extract::cookie::{Cookie, CookieJar};
use parking_lot::Mutex;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "filedrop_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStatus {
    Success,
    Danger,
}

impl FlashStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FlashStatus::Success => "success",
            FlashStatus::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Flash {
    pub message: String,
    pub status: FlashStatus,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self { message: message.into(), status: FlashStatus::Success }
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self { message: message.into(), status: FlashStatus::Danger }
    }
}

/// At most one pending message per session; a new one replaces it.
#[derive(Default)]
pub struct FlashStore {
    inner: Mutex<HashMap<Uuid, Flash>>,
}

impl FlashStore {
    pub fn put(&self, session: Uuid, flash: Flash) {
        self.inner.lock().insert(session, flash);
    }

    /// Read-and-clear: the next take for the same session is empty.
    pub fn take(&self, session: Uuid) -> Option<Flash> {
        self.inner.lock().remove(&session)
    }
}

/// Session id from the cookie jar, minting a new id (and cookie) when the
/// jar has none or the value is not a UUID.
pub fn session(jar: CookieJar) -> (CookieJar, Uuid) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Ok(id) = Uuid::parse_str(cookie.value()) {
            return (jar, id);
        }
    }

    let id = Uuid::new_v4();
    let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .build();
    (jar.add(cookie), id)
}
