//! Per-user profile documents keyed by uid

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::AuthError;
use crate::types::{ProfileUpdate, UserRole};

/// Stored profile. Every field is optional so the same shape serves as a
/// partial document for merges.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(default, rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

impl ProfileDocument {
    pub fn last_login(at: DateTime<Utc>) -> Self {
        Self {
            last_login: Some(at),
            ..Default::default()
        }
    }

    /// Overlay the fields present in `other`
    pub fn merge(&mut self, other: &ProfileDocument) {
        if other.email.is_some() {
            self.email = other.email.clone();
        }
        if other.display_name.is_some() {
            self.display_name = other.display_name.clone();
        }
        if other.role.is_some() {
            self.role = other.role;
        }
        if other.photo_url.is_some() {
            self.photo_url = other.photo_url.clone();
        }
        if other.created_at.is_some() {
            self.created_at = other.created_at;
        }
        if other.last_login.is_some() {
            self.last_login = other.last_login;
        }
    }
}

impl From<&ProfileUpdate> for ProfileDocument {
    fn from(update: &ProfileUpdate) -> Self {
        Self {
            display_name: update.display_name.clone(),
            photo_url: update.photo_url.clone(),
            role: update.role,
            ..Default::default()
        }
    }
}

/// Document store holding user profiles. `auth` is the signed-in user's
/// provider token, when there is one.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, uid: &str, auth: Option<&str>) -> Result<Option<ProfileDocument>, AuthError>;

    /// Replace the whole document
    async fn set_profile(&self, uid: &str, doc: &ProfileDocument, auth: Option<&str>) -> Result<(), AuthError>;

    /// Write only the fields present in `doc`, creating the document if needed
    async fn merge_profile(&self, uid: &str, doc: &ProfileDocument, auth: Option<&str>) -> Result<(), AuthError>;
}

/// In-process profile store
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    docs: RwLock<HashMap<String, ProfileDocument>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, uid: &str, _auth: Option<&str>) -> Result<Option<ProfileDocument>, AuthError> {
        Ok(self.docs.read().await.get(uid).cloned())
    }

    async fn set_profile(&self, uid: &str, doc: &ProfileDocument, _auth: Option<&str>) -> Result<(), AuthError> {
        self.docs.write().await.insert(uid.to_string(), doc.clone());
        Ok(())
    }

    async fn merge_profile(&self, uid: &str, doc: &ProfileDocument, _auth: Option<&str>) -> Result<(), AuthError> {
        self.docs
            .write()
            .await
            .entry(uid.to_string())
            .or_default()
            .merge(doc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_merge_keeps_untouched_fields() {
        let store = MemoryProfileStore::new();
        let doc = ProfileDocument {
            email: Some("t@school.edu".into()),
            display_name: Some("Ms. T".into()),
            role: Some(UserRole::Teacher),
            ..Default::default()
        };
        store.set_profile("u1", &doc, None).await.unwrap();

        let now = Utc::now();
        store.merge_profile("u1", &ProfileDocument::last_login(now), None).await.unwrap();

        let stored = store.get_profile("u1", None).await.unwrap().unwrap();
        assert_eq!(stored.role, Some(UserRole::Teacher));
        assert_eq!(stored.display_name.as_deref(), Some("Ms. T"));
        assert_eq!(stored.last_login, Some(now));
    }

    #[tokio::test]
    async fn test_merge_creates_missing_document() {
        let store = MemoryProfileStore::new();
        let update = ProfileUpdate {
            display_name: Some("New".into()),
            ..Default::default()
        };
        store.merge_profile("u2", &ProfileDocument::from(&update), None).await.unwrap();

        let stored = store.get_profile("u2", None).await.unwrap().unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("New"));
        assert!(stored.role.is_none());
        assert!(store.get_profile("nobody", None).await.unwrap().is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let doc = ProfileDocument {
            photo_url: Some("https://x/p.png".into()),
            display_name: Some("A".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["photoURL"], "https://x/p.png");
        assert_eq!(value["displayName"], "A");
        assert!(value.get("role").is_none());
    }
}
