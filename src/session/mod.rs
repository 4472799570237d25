//! Session store
//!
//! Keyed session records with expiry and activity timestamps. The store is the
//! client-side half of the session layer: each client context owns one, backed
//! by its own local storage, the way a browser tab owns its local storage.

pub mod storage;
pub mod store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{SessionData, UserRole};

pub use storage::LocalStorage;
pub use store::LocalSessionStore;

/// Attributes recorded when a session is created
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionAttributes {
    pub user_id: String,
    pub email: String,
    pub role: UserRole,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// A stored session record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(flatten)]
    pub attributes: SessionAttributes,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionRecord {
    pub fn data(&self) -> SessionData {
        SessionData {
            user_id: self.attributes.user_id.clone(),
            expires_at: self.expires_at,
            last_activity: self.last_activity,
        }
    }
}

/// Request metadata attached to new sessions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to sign session token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Corrupt session record: {0}")]
    Record(#[from] serde_json::Error),
}

/// Capability surface of a session store
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session and make it the current one; returns its token
    async fn create_session(&self, attrs: SessionAttributes) -> Result<String, SessionError>;

    /// Full record of a session by token, or of the current session when no
    /// token is given. Expired or unknown sessions yield `None`.
    async fn get_record(&self, token: Option<&str>) -> Result<Option<SessionRecord>, SessionError>;

    /// Look up a session by token, or the current session when no token is
    /// given. Expired or unknown sessions yield `None`.
    async fn get_session(&self, token: Option<&str>) -> Result<Option<SessionData>, SessionError> {
        Ok(self.get_record(token).await?.map(|record| record.data()))
    }

    /// Extend a session's expiry. Activity is left untouched. `false` when
    /// the token does not name a live session.
    async fn refresh_session(&self, token: &str) -> Result<bool, SessionError>;

    /// Record client activity on a session. `false` when the token does not
    /// name a live session.
    async fn touch_session(&self, token: &str) -> Result<bool, SessionError>;

    /// Destroy the current session. Safe to call with no current session.
    async fn destroy_session(&self) -> Result<(), SessionError>;

    /// Destroy one session by token. Safe to call for unknown tokens.
    async fn remove_session(&self, token: &str) -> Result<(), SessionError>;

    /// Token of the current session, if any
    async fn current_token(&self) -> Option<String>;

    /// Tokens of all sessions held in local storage
    async fn stored_tokens(&self) -> Vec<String>;
}

/// Generate a random secret for signing session tokens
pub fn generate_token_secret() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}
