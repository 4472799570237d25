//! Per-client authentication state

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::cookies::CookieJar;
use super::identity::ProviderUser;
use crate::session::{ClientInfo, SessionStore};
use crate::types::{SessionData, User};

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    SignedOut,
    Authenticated(User),
}

/// Everything one client owns: its auth state, provider credential, session
/// store and cookies. Operations on it go through
/// [`AuthService`](super::AuthService).
pub struct AuthContext {
    state: AuthState,
    credential: Option<ProviderUser>,
    sessions: Arc<dyn SessionStore>,
    cookies: CookieJar,
    client: ClientInfo,
}

impl AuthContext {
    pub fn new(sessions: Arc<dyn SessionStore>, client: ClientInfo) -> Self {
        Self {
            state: AuthState::SignedOut,
            credential: None,
            sessions,
            cookies: CookieJar::new(),
            client,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn user(&self) -> Option<&User> {
        match &self.state {
            AuthState::Authenticated(user) => Some(user),
            AuthState::SignedOut => None,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self.state, AuthState::Authenticated(_))
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    pub fn client_info(&self) -> &ClientInfo {
        &self.client
    }

    pub fn set_client_info(&mut self, client: ClientInfo) {
        self.client = client;
    }

    pub(crate) fn credential(&self) -> Option<&ProviderUser> {
        self.credential.as_ref()
    }

    pub(crate) fn set_credential(&mut self, credential: Option<ProviderUser>) {
        self.credential = credential;
    }

    pub fn session_data(&self) -> Option<&SessionData> {
        self.user().and_then(|u| u.session_data.as_ref())
    }

    /// Valid while the cached session has neither expired nor gone idle
    pub fn is_session_valid_at(&self, now: DateTime<Utc>, inactivity: Duration) -> bool {
        self.session_data()
            .map(|data| data.is_valid_at(now, inactivity))
            .unwrap_or(false)
    }

    pub fn session_time_remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.session_data()
            .map(|data| data.remaining_at(now))
            .unwrap_or_else(Duration::zero)
    }

    pub(crate) fn authenticate(&mut self, user: User, credential: Option<ProviderUser>) {
        self.state = AuthState::Authenticated(user);
        self.credential = credential;
    }

    pub(crate) fn update_user(&mut self, update: impl FnOnce(&mut User)) {
        if let AuthState::Authenticated(user) = &mut self.state {
            update(user);
        }
    }

    /// Drop to `SignedOut`, returning what was held
    pub(crate) fn clear(&mut self) -> (Option<User>, Option<ProviderUser>) {
        let previous = std::mem::replace(&mut self.state, AuthState::SignedOut);
        let user = match previous {
            AuthState::Authenticated(user) => Some(user),
            AuthState::SignedOut => None,
        };
        (user, self.credential.take())
    }
}
