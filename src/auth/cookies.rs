//! Auth cookies mirrored for the route guard
//!
//! The guard in front of the portal only looks at three cookies: a token
//! naming the user, the user's role and the session expiry in epoch ms.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::CookieConfig;
use crate::types::User;

pub const AUTH_TOKEN_COOKIE: &str = "auth-token";
pub const USER_ROLE_COOKIE: &str = "user-role";
pub const SESSION_EXPIRY_COOKIE: &str = "session-expiry";

const EPOCH_EXPIRES: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub max_age: Option<i64>,
    pub same_site: Option<String>,
    pub http_only: bool,
    /// Expire immediately (clearing cookie)
    pub expired: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: path.into(),
            max_age: None,
            same_site: None,
            http_only: false,
            expired: false,
        }
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn same_site(mut self, same_site: impl Into<String>) -> Self {
        self.same_site = Some(same_site.into());
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// A cookie that removes `name` from the client
    pub fn clearing(name: impl Into<String>, path: impl Into<String>) -> Self {
        let mut cookie = Self::new(name, "", path);
        cookie.expired = true;
        cookie
    }
}

/// `Set-Cookie` header value
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path={}", self.name, self.value, self.path)?;
        if self.expired {
            write!(f, "; Expires={}", EPOCH_EXPIRES)?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age)?;
        }
        if let Some(same_site) = &self.same_site {
            write!(f, "; SameSite={}", capitalize(same_site))?;
        }
        if self.http_only {
            write!(f, "; HttpOnly")?;
        }
        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// Builds the auth cookies from config
#[derive(Debug, Clone)]
pub struct CookieBridge {
    config: CookieConfig,
}

impl CookieBridge {
    pub fn new(config: CookieConfig) -> Self {
        Self { config }
    }

    pub fn auth_cookies(&self, user: &User, now: DateTime<Utc>) -> Vec<Cookie> {
        let expiry = now + Duration::seconds(self.config.max_age_secs);
        [
            (AUTH_TOKEN_COOKIE, format!("firebase-token-{}", user.uid)),
            (USER_ROLE_COOKIE, user.role.as_str().to_string()),
            (SESSION_EXPIRY_COOKIE, expiry.timestamp_millis().to_string()),
        ]
        .into_iter()
        .map(|(name, value)| {
            Cookie::new(name, value, self.config.path.clone())
                .max_age(self.config.max_age_secs)
                .same_site(self.config.same_site.clone())
        })
        .collect()
    }

    pub fn cleared(&self) -> Vec<Cookie> {
        [AUTH_TOKEN_COOKIE, USER_ROLE_COOKIE, SESSION_EXPIRY_COOKIE]
            .into_iter()
            .map(|name| Cookie::clearing(name, self.config.path.clone()))
            .collect()
    }
}

/// One client's cookies: current values plus the changes not yet delivered
#[derive(Debug, Default)]
pub struct CookieJar {
    values: BTreeMap<String, String>,
    outgoing: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, cookies: Vec<Cookie>) {
        for cookie in cookies {
            if cookie.expired {
                self.values.remove(&cookie.name);
            } else {
                self.values.insert(cookie.name.clone(), cookie.value.clone());
            }
            self.outgoing.retain(|c| c.name != cookie.name);
            self.outgoing.push(cookie);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Changes since the last call, to be sent as `Set-Cookie` headers
    pub fn take_outgoing(&mut self) -> Vec<Cookie> {
        std::mem::take(&mut self.outgoing)
    }
}
