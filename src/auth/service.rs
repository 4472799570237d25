//! Authentication operations over a client's [`AuthContext`]
//!
//! Each operation either talks to the identity provider and document store
//! or, in demo mode, to the hardcoded demo accounts. Successful sign-ins
//! create a session record in the client's store and mirror it to cookies.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::context::AuthContext;
use super::cookies::CookieBridge;
use super::demo;
use super::firebase::FirebaseIdentityProvider;
use super::firestore::FirestoreProfileStore;
use super::identity::{IdentityProvider, ProviderUser};
use super::profiles::{ProfileDocument, ProfileStore};
use super::AuthError;
use crate::config::Config;
use crate::session::{ClientInfo, LocalSessionStore, SessionAttributes, SessionError, SessionStore};
use crate::types::{ProfileUpdate, User, UserRole};

/// Where credentials are checked
pub enum AuthBackend {
    Demo,
    Provider {
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
    },
}

/// Result of one reconciliation pass over a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nobody signed in
    Idle,
    Refreshed,
    /// Session still valid but could not be extended
    RefreshFailed,
    /// Session invalid; the context was signed out
    Expired,
}

#[derive(Debug, Clone, Copy)]
enum SessionOp {
    Refresh,
    Touch,
}

pub struct AuthService {
    backend: AuthBackend,
    cookies: CookieBridge,
    inactivity: Duration,
    lifetime: Duration,
    session_secret: String,
}

impl AuthService {
    pub fn new(backend: AuthBackend, config: &Config, session_secret: impl Into<String>) -> Self {
        Self {
            backend,
            cookies: CookieBridge::new(config.cookies.clone()),
            inactivity: config.session.inactivity(),
            lifetime: config.session.lifetime(),
            session_secret: session_secret.into(),
        }
    }

    /// Demo accounts unless the provider is fully configured
    pub fn from_config(config: &Config, session_secret: impl Into<String>) -> Result<Self> {
        let backend = if config.identity.is_demo_mode() {
            info!("Authentication running in demo mode");
            AuthBackend::Demo
        } else {
            AuthBackend::Provider {
                identity: Arc::new(FirebaseIdentityProvider::from_config(&config.identity)?),
                profiles: Arc::new(FirestoreProfileStore::from_config(&config.identity)?),
            }
        };
        Ok(Self::new(backend, config, session_secret))
    }

    pub fn is_demo_mode(&self) -> bool {
        matches!(self.backend, AuthBackend::Demo)
    }

    pub fn inactivity(&self) -> Duration {
        self.inactivity
    }

    /// A fresh signed-out context with its own session storage
    pub fn new_context(&self, client: ClientInfo) -> AuthContext {
        let sessions = LocalSessionStore::new(self.session_secret.clone(), self.lifetime);
        AuthContext::new(Arc::new(sessions), client)
    }

    pub async fn sign_in(&self, ctx: &mut AuthContext, email: &str, password: &str) -> Result<User, AuthError> {
        match &self.backend {
            AuthBackend::Demo => {
                let account = demo::authenticate(email, password)?;
                let mut user = account.to_user();

                let sessions = ctx.sessions().clone();
                let token = start_session(sessions.as_ref(), session_attributes(&user, ctx.client_info())).await?;
                user.session_data = sessions.get_session(Some(&token)).await?;

                Ok(self.establish(ctx, user, None))
            }
            AuthBackend::Provider { identity, profiles } => {
                let credential = identity.sign_in_with_password(email, password).await?;
                let profile = profiles
                    .get_profile(&credential.uid, Some(&credential.id_token))
                    .await?;

                let mut user = build_user(&credential, profile.as_ref())?;
                self.attach_session(ctx, &mut user).await;

                let last_login = ProfileDocument::last_login(user.last_login.unwrap_or_else(Utc::now));
                profiles
                    .merge_profile(&user.uid, &last_login, Some(&credential.id_token))
                    .await?;

                Ok(self.establish(ctx, user, Some(credential)))
            }
        }
    }

    /// Create a provider account. Only students and teachers may sign up.
    pub async fn sign_up(
        &self,
        ctx: &mut AuthContext,
        email: &str,
        password: &str,
        display_name: &str,
        role: UserRole,
    ) -> Result<User, AuthError> {
        let AuthBackend::Provider { identity, profiles } = &self.backend else {
            return Err(AuthError::UnsupportedInDemoMode("Sign up"));
        };
        if role == UserRole::Admin {
            return Err(AuthError::InvalidRole(role));
        }

        let credential = identity.sign_up(email, password).await?;
        let credential = identity.update_profile(&credential, display_name, None).await?;

        let now = Utc::now();
        let profile = ProfileDocument {
            email: Some(email.to_string()),
            display_name: Some(display_name.to_string()),
            role: Some(role),
            photo_url: None,
            created_at: Some(now),
            last_login: Some(now),
        };
        profiles
            .set_profile(&credential.uid, &profile, Some(&credential.id_token))
            .await?;

        let mut user = build_user(&credential, Some(&profile))?;
        self.attach_session(ctx, &mut user).await;

        info!("Signed up {} as {}", user.email, user.role);
        Ok(self.establish(ctx, user, Some(credential)))
    }

    /// Sign in with a federated id token (e.g. Google). First-time users get
    /// a student profile.
    pub async fn sign_in_with_oauth(
        &self,
        ctx: &mut AuthContext,
        id_token: &str,
        provider_id: &str,
    ) -> Result<User, AuthError> {
        let AuthBackend::Provider { identity, profiles } = &self.backend else {
            return Err(AuthError::UnsupportedInDemoMode(if provider_id == "google.com" {
                "Google sign-in"
            } else {
                "OAuth sign-in"
            }));
        };

        let credential = identity.sign_in_with_idp(id_token, provider_id).await?;
        let profile = profiles
            .get_profile(&credential.uid, Some(&credential.id_token))
            .await?;

        let mut user = build_user(&credential, profile.as_ref())?;
        self.attach_session(ctx, &mut user).await;

        let now = user.last_login.unwrap_or_else(Utc::now);
        if profile.is_some() {
            profiles
                .merge_profile(&user.uid, &ProfileDocument::last_login(now), Some(&credential.id_token))
                .await?;
        } else {
            let created = ProfileDocument {
                email: Some(user.email.clone()),
                display_name: Some(user.display_name.clone()),
                role: Some(user.role),
                photo_url: user.photo_url.clone(),
                created_at: user.created_at,
                last_login: Some(now),
            };
            profiles
                .set_profile(&user.uid, &created, Some(&credential.id_token))
                .await?;
            debug!("Created profile for first {} sign-in of {}", provider_id, user.email);
        }

        Ok(self.establish(ctx, user, Some(credential)))
    }

    /// Destroy the session, clear cookies and end the provider session.
    /// Local state is cleared first, so the context is signed out even when
    /// a later step fails. Safe to repeat.
    pub async fn sign_out(&self, ctx: &mut AuthContext) -> Result<(), AuthError> {
        let (user, credential) = ctx.clear();

        let sessions = ctx.sessions().clone();
        let mut destroyed = sessions.destroy_session().await;
        if let (true, Some(user)) = (destroyed.is_ok(), &user) {
            destroyed = purge_user_sessions(sessions.as_ref(), &user.uid).await;
        }
        ctx.cookies_mut().apply(self.cookies.cleared());

        if let (AuthBackend::Provider { identity, .. }, Some(credential)) = (&self.backend, credential.as_ref()) {
            identity.sign_out(credential).await?;
        }
        destroyed?;

        if let Some(user) = user {
            info!("Signed out {}", user.email);
        }
        Ok(())
    }

    pub async fn update_user_profile(&self, ctx: &mut AuthContext, updates: &ProfileUpdate) -> Result<User, AuthError> {
        let Some(current) = ctx.user().cloned() else {
            return Err(AuthError::NotSignedIn);
        };
        if updates.role == Some(UserRole::Admin) && current.role != UserRole::Admin {
            return Err(AuthError::InvalidRole(UserRole::Admin));
        }

        if let AuthBackend::Provider { identity, profiles } = &self.backend {
            if updates.touches_provider_profile() {
                if let Some(credential) = ctx.credential().cloned() {
                    let display_name = updates.display_name.as_deref().unwrap_or(&current.display_name);
                    let photo_url = updates.photo_url.as_deref().or(current.photo_url.as_deref());
                    let updated = identity.update_profile(&credential, display_name, photo_url).await?;
                    ctx.set_credential(Some(updated));
                }
            }

            let token = ctx.credential().map(|c| c.id_token.clone());
            profiles
                .merge_profile(&current.uid, &ProfileDocument::from(updates), token.as_deref())
                .await?;
        }

        ctx.update_user(|user| updates.apply_to(user));
        let user = ctx.user().cloned().ok_or(AuthError::NotSignedIn)?;
        if updates.role.is_some() {
            ctx.cookies_mut().apply(self.cookies.auth_cookies(&user, Utc::now()));
        }
        Ok(user)
    }

    pub fn is_session_valid(&self, ctx: &AuthContext) -> bool {
        ctx.is_session_valid_at(Utc::now(), self.inactivity)
    }

    pub fn session_time_remaining(&self, ctx: &AuthContext) -> Duration {
        ctx.session_time_remaining_at(Utc::now())
    }

    /// Extend the current user's session. Looks through the client's stored
    /// tokens for one that belongs to the user, preferring the current one.
    /// Never fails: store errors are logged and reported as `false`.
    pub async fn refresh_session(&self, ctx: &mut AuthContext) -> bool {
        self.sync_session(ctx, SessionOp::Refresh).await
    }

    /// Mark the session active on behalf of a real client request. The
    /// watchdog never calls this, so an idle client goes stale.
    pub async fn record_activity(&self, ctx: &mut AuthContext) -> bool {
        self.sync_session(ctx, SessionOp::Touch).await
    }

    async fn sync_session(&self, ctx: &mut AuthContext, op: SessionOp) -> bool {
        let Some(user) = ctx.user() else {
            return false;
        };
        if user.session_data.is_none() {
            return false;
        }
        let uid = user.uid.clone();
        let sessions = ctx.sessions().clone();

        let token = match find_user_token(sessions.as_ref(), &uid).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("No stored session belongs to {}", uid);
                return false;
            }
            Err(e) => {
                warn!("Session lookup failed during {:?}: {}", op, e);
                return false;
            }
        };

        let applied = match op {
            SessionOp::Refresh => sessions.refresh_session(&token).await,
            SessionOp::Touch => sessions.touch_session(&token).await,
        };
        match applied {
            Ok(true) => {
                match sessions.get_session(Some(&token)).await {
                    Ok(Some(data)) => ctx.update_user(|user| user.session_data = Some(data)),
                    Ok(None) => warn!("Session vanished right after {:?}", op),
                    Err(e) => warn!("Failed to re-read session after {:?}: {}", op, e),
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Session {:?} failed: {}", op, e);
                false
            }
        }
    }

    /// One watchdog pass: refresh a valid session, sign out an invalid one
    pub async fn reconcile(&self, ctx: &mut AuthContext) -> ReconcileOutcome {
        if !ctx.is_signed_in() {
            return ReconcileOutcome::Idle;
        }

        if self.is_session_valid(ctx) {
            if self.refresh_session(ctx).await {
                ReconcileOutcome::Refreshed
            } else {
                ReconcileOutcome::RefreshFailed
            }
        } else {
            if let Err(e) = self.sign_out(ctx).await {
                warn!("Sign-out of expired session failed: {}", e);
            }
            ReconcileOutcome::Expired
        }
    }

    /// Sign out a context whose session is no longer valid. Returns whether
    /// the context is still signed in.
    pub async fn enforce_validity(&self, ctx: &mut AuthContext) -> bool {
        if !ctx.is_signed_in() {
            return false;
        }
        if self.is_session_valid(ctx) {
            return true;
        }
        if let Err(e) = self.sign_out(ctx).await {
            warn!("Sign-out of invalid session failed: {}", e);
        }
        false
    }

    fn establish(&self, ctx: &mut AuthContext, user: User, credential: Option<ProviderUser>) -> User {
        ctx.cookies_mut().apply(self.cookies.auth_cookies(&user, Utc::now()));
        ctx.authenticate(user.clone(), credential);
        info!("Authenticated {} ({})", user.email, user.role);
        user
    }

    /// Session creation failure is not fatal for provider sign-in; the user
    /// continues without session data.
    async fn attach_session(&self, ctx: &AuthContext, user: &mut User) {
        let sessions = ctx.sessions().clone();
        let token = match start_session(sessions.as_ref(), session_attributes(user, ctx.client_info())).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Session creation failed for {}: {}", user.uid, e);
                return;
            }
        };
        match sessions.get_session(Some(&token)).await {
            Ok(data) => user.session_data = data,
            Err(e) => warn!("Failed to read new session for {}: {}", user.uid, e),
        }
    }
}

fn session_attributes(user: &User, client: &ClientInfo) -> SessionAttributes {
    SessionAttributes {
        user_id: user.uid.clone(),
        email: user.email.clone(),
        role: user.role,
        display_name: user.display_name.clone(),
        user_agent: client.user_agent.clone(),
        ip_address: client.ip_address.clone(),
    }
}

/// Provider user plus stored profile into a portal user
fn build_user(credential: &ProviderUser, profile: Option<&ProfileDocument>) -> Result<User, AuthError> {
    let email = credential.email.clone().ok_or_else(|| AuthError::Provider {
        code: "MISSING_EMAIL".to_string(),
        message: "Identity provider returned a user without an email".to_string(),
    })?;

    let display_name = credential
        .display_name
        .clone()
        .or_else(|| profile.and_then(|p| p.display_name.clone()))
        .unwrap_or_else(|| "User".to_string());

    Ok(User {
        uid: credential.uid.clone(),
        email,
        display_name,
        role: profile.and_then(|p| p.role).unwrap_or_default(),
        photo_url: credential
            .photo_url
            .clone()
            .or_else(|| profile.and_then(|p| p.photo_url.clone())),
        created_at: Some(profile.and_then(|p| p.created_at).unwrap_or_else(Utc::now)),
        last_login: Some(Utc::now()),
        session_data: None,
    })
}

/// Replace the client's current session with a new one
async fn start_session(sessions: &dyn SessionStore, attrs: SessionAttributes) -> Result<String, SessionError> {
    sessions.destroy_session().await?;
    sessions.create_session(attrs).await
}

/// Destroy every stored session that belongs to `uid`
async fn purge_user_sessions(sessions: &dyn SessionStore, uid: &str) -> Result<(), SessionError> {
    for token in sessions.stored_tokens().await {
        if let Some(record) = sessions.get_record(Some(&token)).await? {
            if record.attributes.user_id == uid {
                sessions.remove_session(&token).await?;
            }
        }
    }
    Ok(())
}

async fn find_user_token(sessions: &dyn SessionStore, uid: &str) -> Result<Option<String>, AuthError> {
    let mut candidates: Vec<String> = sessions.current_token().await.into_iter().collect();
    candidates.extend(sessions.stored_tokens().await);

    for token in candidates {
        if let Some(data) = sessions.get_session(Some(&token)).await? {
            if data.user_id == uid {
                return Ok(Some(token));
            }
        }
    }
    Ok(None)
}
