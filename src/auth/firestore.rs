//! Firestore REST profile store (`users/{uid}` documents)

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::profiles::{ProfileDocument, ProfileStore};
use super::AuthError;
use crate::config::IdentityConfig;
use crate::types::UserRole;

const USERS_COLLECTION: &str = "users";

pub struct FirestoreProfileStore {
    client: Client,
    base_url: String,
    project_id: String,
}

impl FirestoreProfileStore {
    pub fn new(base_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        let project_id = config
            .project_id
            .clone()
            .context("Firebase project id not set. Set FIREBASE_PROJECT_ID or [identity].project_id")?;
        Ok(Self::new(config.firestore_base_url.clone(), project_id))
    }

    fn document_url(&self, uid: &str) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}/{}",
            self.base_url, self.project_id, USERS_COLLECTION, uid
        )
    }

    fn authorize(builder: RequestBuilder, auth: Option<&str>) -> RequestBuilder {
        match auth {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn write(
        &self,
        uid: &str,
        doc: &ProfileDocument,
        mask: Option<Vec<&'static str>>,
        auth: Option<&str>,
    ) -> Result<(), AuthError> {
        let mut builder = self.client.patch(self.document_url(uid));
        if let Some(paths) = mask {
            let query: Vec<(&str, &str)> = paths.into_iter().map(|p| ("updateMask.fieldPaths", p)).collect();
            builder = builder.query(&query);
        }

        let response = Self::authorize(builder, auth)
            .json(&json!({ "fields": encode_fields(doc) }))
            .send()
            .await
            .map_err(|e| AuthError::Profile(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Profile(format!("HTTP {}: {}", status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for FirestoreProfileStore {
    async fn get_profile(&self, uid: &str, auth: Option<&str>) -> Result<Option<ProfileDocument>, AuthError> {
        let response = Self::authorize(self.client.get(self.document_url(uid)), auth)
            .send()
            .await
            .map_err(|e| AuthError::Profile(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("No profile document for {}", uid);
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Profile(format!("HTTP {}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::Profile(format!("Malformed document: {}", e)))?;
        let fields = body.get("fields").and_then(|f| f.as_object()).cloned().unwrap_or_default();
        Ok(Some(decode_fields(&fields)))
    }

    async fn set_profile(&self, uid: &str, doc: &ProfileDocument, auth: Option<&str>) -> Result<(), AuthError> {
        self.write(uid, doc, None, auth).await
    }

    async fn merge_profile(&self, uid: &str, doc: &ProfileDocument, auth: Option<&str>) -> Result<(), AuthError> {
        let paths = field_paths(doc);
        if paths.is_empty() {
            return Ok(());
        }
        self.write(uid, doc, Some(paths), auth).await
    }
}

fn field_paths(doc: &ProfileDocument) -> Vec<&'static str> {
    let mut paths = Vec::new();
    if doc.email.is_some() {
        paths.push("email");
    }
    if doc.display_name.is_some() {
        paths.push("displayName");
    }
    if doc.role.is_some() {
        paths.push("role");
    }
    if doc.photo_url.is_some() {
        paths.push("photoURL");
    }
    if doc.created_at.is_some() {
        paths.push("createdAt");
    }
    if doc.last_login.is_some() {
        paths.push("lastLogin");
    }
    paths
}

fn string_value(s: &str) -> Value {
    json!({ "stringValue": s })
}

fn timestamp_value(at: &DateTime<Utc>) -> Value {
    json!({ "timestampValue": at.to_rfc3339_opts(SecondsFormat::Micros, true) })
}

/// Encode into Firestore typed values
fn encode_fields(doc: &ProfileDocument) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(email) = &doc.email {
        fields.insert("email".into(), string_value(email));
    }
    if let Some(name) = &doc.display_name {
        fields.insert("displayName".into(), string_value(name));
    }
    if let Some(role) = doc.role {
        fields.insert("role".into(), string_value(role.as_str()));
    }
    if let Some(photo) = &doc.photo_url {
        fields.insert("photoURL".into(), string_value(photo));
    }
    if let Some(at) = &doc.created_at {
        fields.insert("createdAt".into(), timestamp_value(at));
    }
    if let Some(at) = &doc.last_login {
        fields.insert("lastLogin".into(), timestamp_value(at));
    }
    fields
}

fn decode_fields(fields: &Map<String, Value>) -> ProfileDocument {
    let string = |name: &str| {
        fields
            .get(name)
            .and_then(|v| v.get("stringValue"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    let timestamp = |name: &str| {
        fields
            .get(name)
            .and_then(|v| v.get("timestampValue"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    };

    ProfileDocument {
        email: string("email"),
        display_name: string("displayName"),
        role: string("role").and_then(|r| UserRole::parse(&r)),
        photo_url: string("photoURL"),
        created_at: timestamp("createdAt"),
        last_login: timestamp("lastLogin"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_only_present_fields() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap().with_timezone(&Utc);
        let fields = encode_fields(&ProfileDocument::last_login(at));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["lastLogin"]["timestampValue"], "2024-05-01T12:00:00.000000Z");
        assert_eq!(field_paths(&ProfileDocument::last_login(at)), vec!["lastLogin"]);
    }

    #[test]
    fn test_decode_document() {
        let fields = json!({
            "email": {"stringValue": "t@school.edu"},
            "role": {"stringValue": "teacher"},
            "createdAt": {"timestampValue": "2023-09-01T08:30:00.123Z"},
            "unrelated": {"integerValue": "3"}
        });
        let doc = decode_fields(fields.as_object().unwrap());
        assert_eq!(doc.email.as_deref(), Some("t@school.edu"));
        assert_eq!(doc.role, Some(UserRole::Teacher));
        assert!(doc.created_at.is_some());
        assert!(doc.display_name.is_none());
    }

    #[test]
    fn test_unknown_role_is_ignored() {
        let fields = json!({"role": {"stringValue": "principal"}});
        assert_eq!(decode_fields(fields.as_object().unwrap()).role, None);
    }

    #[test]
    fn test_document_url() {
        let store = FirestoreProfileStore::new("https://firestore.googleapis.com/v1/", "portal");
        assert_eq!(
            store.document_url("abc"),
            "https://firestore.googleapis.com/v1/projects/portal/databases/(default)/documents/users/abc"
        );
    }
}
