//! Session store backed by per-client local storage
//!
//! Tokens are HS256-signed so a client cannot mint a session for another
//! user by editing its storage. The stored record, not the token's `exp`,
//! is authoritative for expiry since refreshes extend it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::{session_key, LocalStorage, CURRENT_SESSION_KEY};
use super::{SessionAttributes, SessionError, SessionRecord, SessionStore};

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    /// Subject (user ID)
    sub: String,
    /// Issued at
    iat: i64,
    /// Initial expiry
    exp: i64,
    /// Session ID
    jti: String,
}

pub struct LocalSessionStore {
    storage: Arc<LocalStorage>,
    secret: String,
    lifetime: Duration,
}

impl LocalSessionStore {
    pub fn new(secret: impl Into<String>, lifetime: Duration) -> Self {
        Self::with_storage(Arc::new(LocalStorage::new()), secret, lifetime)
    }

    pub fn with_storage(storage: Arc<LocalStorage>, secret: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            storage,
            secret: secret.into(),
            lifetime,
        }
    }

    pub fn storage(&self) -> &Arc<LocalStorage> {
        &self.storage
    }

    fn sign(&self, user_id: &str, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Result<String, SessionError> {
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    /// Verify the token signature; expiry is checked against the record
    fn verify(&self, token: &str) -> Option<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        match decode::<SessionClaims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                warn!("Rejected session token: {}", e);
                None
            }
        }
    }

    async fn resolve_token(&self, token: Option<&str>) -> Option<String> {
        match token {
            Some(token) => Some(token.to_string()),
            None => self.storage.get(CURRENT_SESSION_KEY).await,
        }
    }

    async fn load(&self, token: &str) -> Result<Option<SessionRecord>, SessionError> {
        let Some(claims) = self.verify(token) else {
            return Ok(None);
        };

        let Some(raw) = self.storage.get(&session_key(token)).await else {
            return Ok(None);
        };
        let record: SessionRecord = serde_json::from_str(&raw)?;

        if record.attributes.user_id != claims.sub {
            warn!("Session record does not belong to token subject");
            return Ok(None);
        }

        if Utc::now() >= record.expires_at {
            debug!("Session for {} expired, dropping record", record.attributes.user_id);
            self.forget(token).await;
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn save(&self, token: &str, record: &SessionRecord) -> Result<(), SessionError> {
        let raw = serde_json::to_string(record)?;
        self.storage.set(session_key(token), raw).await;
        Ok(())
    }

    async fn forget(&self, token: &str) {
        self.storage.remove(&session_key(token)).await;
        if self.storage.get(CURRENT_SESSION_KEY).await.as_deref() == Some(token) {
            self.storage.remove(CURRENT_SESSION_KEY).await;
        }
    }
}

#[async_trait]
impl SessionStore for LocalSessionStore {
    async fn create_session(&self, attrs: SessionAttributes) -> Result<String, SessionError> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;
        let token = self.sign(&attrs.user_id, now, expires_at)?;

        let record = SessionRecord {
            attributes: attrs,
            created_at: now,
            expires_at,
            last_activity: now,
        };
        self.save(&token, &record).await?;
        self.storage.set(CURRENT_SESSION_KEY, token.clone()).await;

        debug!("Created session for {}", record.attributes.user_id);
        Ok(token)
    }

    async fn get_record(&self, token: Option<&str>) -> Result<Option<SessionRecord>, SessionError> {
        match self.resolve_token(token).await {
            Some(token) => self.load(&token).await,
            None => Ok(None),
        }
    }

    async fn refresh_session(&self, token: &str) -> Result<bool, SessionError> {
        let Some(mut record) = self.load(token).await? else {
            return Ok(false);
        };

        record.expires_at = Utc::now() + self.lifetime;
        self.save(token, &record).await?;

        debug!("Refreshed session for {}", record.attributes.user_id);
        Ok(true)
    }

    async fn touch_session(&self, token: &str) -> Result<bool, SessionError> {
        let Some(mut record) = self.load(token).await? else {
            return Ok(false);
        };

        record.last_activity = Utc::now();
        self.save(token, &record).await?;
        Ok(true)
    }

    async fn destroy_session(&self) -> Result<(), SessionError> {
        if let Some(token) = self.storage.remove(CURRENT_SESSION_KEY).await {
            self.storage.remove(&session_key(&token)).await;
            debug!("Destroyed current session");
        }
        Ok(())
    }

    async fn remove_session(&self, token: &str) -> Result<(), SessionError> {
        self.forget(token).await;
        Ok(())
    }

    async fn current_token(&self) -> Option<String> {
        self.storage.get(CURRENT_SESSION_KEY).await
    }

    async fn stored_tokens(&self) -> Vec<String> {
        self.storage.session_tokens().await
    }
}

/// Shift `last_activity` of every stored record into the past
#[cfg(test)]
pub(crate) async fn age_activity(storage: &LocalStorage, by: Duration) {
    for token in storage.session_tokens().await {
        let key = session_key(&token);
        if let Some(raw) = storage.get(&key).await {
            let mut record: SessionRecord = serde_json::from_str(&raw).unwrap();
            record.last_activity = record.last_activity - by;
            storage.set(key, serde_json::to_string(&record).unwrap()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserRole;

    fn attrs(user_id: &str) -> SessionAttributes {
        SessionAttributes {
            user_id: user_id.to_string(),
            email: format!("{}@example.com", user_id),
            role: UserRole::Student,
            display_name: user_id.to_string(),
            user_agent: None,
            ip_address: None,
        }
    }

    fn store() -> LocalSessionStore {
        LocalSessionStore::new("test-secret", Duration::hours(24))
    }

    #[tokio::test]
    async fn test_create_and_get_current_session() {
        let store = store();
        let token = store.create_session(attrs("u1")).await.unwrap();

        let by_token = store.get_session(Some(&token)).await.unwrap().unwrap();
        let current = store.get_session(None).await.unwrap().unwrap();
        assert_eq!(by_token, current);
        assert_eq!(current.user_id, "u1");
        assert!(current.expires_at > Utc::now() + Duration::hours(23));
        assert_eq!(store.stored_tokens().await, vec![token]);
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped() {
        let store = LocalSessionStore::new("test-secret", Duration::seconds(-1));
        let token = store.create_session(attrs("u1")).await.unwrap();

        assert!(store.get_session(Some(&token)).await.unwrap().is_none());
        assert!(store.stored_tokens().await.is_empty());
        assert!(!store.refresh_session(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_extends_expiry_but_not_activity() {
        let store = store();
        let token = store.create_session(attrs("u1")).await.unwrap();
        let before = store.get_session(Some(&token)).await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(store.refresh_session(&token).await.unwrap());

        let after = store.get_session(Some(&token)).await.unwrap().unwrap();
        assert_eq!(after.last_activity, before.last_activity);
        assert!(after.expires_at > before.expires_at);
    }

    #[tokio::test]
    async fn test_touch_moves_activity_forward() {
        let store = store();
        let token = store.create_session(attrs("u1")).await.unwrap();
        age_activity(store.storage(), Duration::minutes(10)).await;
        let before = store.get_session(Some(&token)).await.unwrap().unwrap();

        assert!(store.touch_session(&token).await.unwrap());

        let after = store.get_session(Some(&token)).await.unwrap().unwrap();
        assert!(after.last_activity > before.last_activity);
        assert_eq!(after.expires_at, before.expires_at);
        assert!(!store.touch_session("not-a-token").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_session_clears_current_pointer() {
        let store = store();
        let first = store.create_session(attrs("u1")).await.unwrap();
        let second = store.create_session(attrs("u1")).await.unwrap();
        assert_eq!(store.current_token().await.as_deref(), Some(second.as_str()));

        store.remove_session(&first).await.unwrap();
        assert_eq!(store.current_token().await.as_deref(), Some(second.as_str()));

        store.remove_session(&second).await.unwrap();
        assert_eq!(store.current_token().await, None);
        assert!(store.stored_tokens().await.is_empty());
    }

    #[tokio::test]
    async fn test_tokens_signed_with_other_secret_are_rejected() {
        let storage = Arc::new(LocalStorage::new());
        let forger = LocalSessionStore::with_storage(storage.clone(), "other", Duration::hours(1));
        let token = forger.create_session(attrs("u1")).await.unwrap();

        let store = LocalSessionStore::with_storage(storage, "test-secret", Duration::hours(1));
        assert!(store.get_session(Some(&token)).await.unwrap().is_none());
        assert!(!store.refresh_session(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let store = store();
        store.destroy_session().await.unwrap();

        let token = store.create_session(attrs("u1")).await.unwrap();
        store.destroy_session().await.unwrap();
        store.destroy_session().await.unwrap();

        assert!(store.get_session(None).await.unwrap().is_none());
        assert!(store.get_session(Some(&token)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_keeps_attributes() {
        let store = store();
        store.create_session(attrs("u7")).await.unwrap();
        let record = store.get_record(None).await.unwrap().unwrap();
        assert_eq!(record.attributes.email, "u7@example.com");
    }
}
