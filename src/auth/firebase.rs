//! Firebase Identity Toolkit REST client

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::identity::{IdentityProvider, ProviderUser};
use super::AuthError;
use crate::config::IdentityConfig;

/// Redirect URI reported to `accounts:signInWithIdp` for id-token exchanges
const IDP_REQUEST_URI: &str = "http://localhost";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

pub struct FirebaseIdentityProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FirebaseIdentityProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("Firebase API key not set. Set FIREBASE_API_KEY or [identity].api_key")?;
        Ok(Self::new(config.identity_base_url.clone(), api_key))
    }

    async fn call(&self, method: &str, body: Value) -> Result<AccountResponse, AuthError> {
        let url = format!("{}/accounts:{}", self.base_url, method);
        debug!("Identity Toolkit call: accounts:{}", method);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(classify_error(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| AuthError::Provider {
            code: "MALFORMED_RESPONSE".to_string(),
            message: e.to_string(),
        })
    }

    fn into_user(account: AccountResponse, fallback_token: Option<&str>) -> Result<ProviderUser, AuthError> {
        let id_token = account
            .id_token
            .or_else(|| fallback_token.map(str::to_string))
            .ok_or_else(|| AuthError::Provider {
                code: "MISSING_ID_TOKEN".to_string(),
                message: "Identity provider returned no id token".to_string(),
            })?;

        Ok(ProviderUser {
            uid: account.local_id,
            email: account.email,
            display_name: account.display_name.filter(|n| !n.is_empty()),
            photo_url: account.photo_url.filter(|p| !p.is_empty()),
            id_token,
            refresh_token: account.refresh_token,
        })
    }
}

/// Map a Firebase error body such as `{"error": {"message": "INVALID_PASSWORD"}}`
fn classify_error(status: StatusCode, body: &str) -> AuthError {
    if status.is_server_error() {
        return AuthError::ProviderUnavailable(format!("HTTP {}", status));
    }

    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    // Messages look like "WEAK_PASSWORD : Password should be at least 6 characters"
    let code = message.split(" : ").next().unwrap_or_default().trim().to_string();

    match code.as_str() {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_IDP_RESPONSE" => {
            AuthError::InvalidCredentials
        }
        _ => AuthError::Provider { code, message },
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<ProviderUser, AuthError> {
        let account = self
            .call(
                "signInWithPassword",
                json!({"email": email, "password": password, "returnSecureToken": true}),
            )
            .await?;
        Self::into_user(account, None)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderUser, AuthError> {
        let account = self
            .call("signUp", json!({"email": email, "password": password, "returnSecureToken": true}))
            .await?;
        info!("Created provider account for {}", email);
        Self::into_user(account, None)
    }

    async fn sign_in_with_idp(&self, id_token: &str, provider_id: &str) -> Result<ProviderUser, AuthError> {
        let post_body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("id_token", id_token)
            .append_pair("providerId", provider_id)
            .finish();

        let account = self
            .call(
                "signInWithIdp",
                json!({
                    "postBody": post_body,
                    "requestUri": IDP_REQUEST_URI,
                    "returnIdpCredential": true,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Self::into_user(account, None)
    }

    async fn update_profile(
        &self,
        user: &ProviderUser,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> Result<ProviderUser, AuthError> {
        let mut body = json!({
            "idToken": user.id_token,
            "displayName": display_name,
            "returnSecureToken": true,
        });
        if let Some(photo) = photo_url {
            body["photoUrl"] = json!(photo);
        }

        let account = self.call("update", body).await?;
        let mut updated = Self::into_user(account, Some(&user.id_token))?;
        if updated.email.is_none() {
            updated.email = user.email.clone();
        }
        if updated.refresh_token.is_none() {
            updated.refresh_token = user.refresh_token.clone();
        }
        Ok(updated)
    }

    async fn sign_out(&self, user: &ProviderUser) -> Result<(), AuthError> {
        // The REST surface has no client-side revoke; dropping the tokens ends
        // this client's provider session.
        if user.refresh_token.is_none() {
            warn!("Signing out provider user {} without a refresh token", user.uid);
        }
        debug!("Discarded provider credential for {}", user.uid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bad_password() {
        let body = r#"{"error": {"code": 400, "message": "INVALID_PASSWORD", "errors": []}}"#;
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, body),
            AuthError::InvalidCredentials
        ));
    }

    #[test]
    fn test_classify_detailed_message() {
        let body = r#"{"error": {"code": 400, "message": "WEAK_PASSWORD : Password should be at least 6 characters"}}"#;
        match classify_error(StatusCode::BAD_REQUEST, body) {
            AuthError::Provider { code, message } => {
                assert_eq!(code, "WEAK_PASSWORD");
                assert!(message.contains("at least 6"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_classify_server_error() {
        assert!(matches!(
            classify_error(StatusCode::SERVICE_UNAVAILABLE, ""),
            AuthError::ProviderUnavailable(_)
        ));
    }

    #[test]
    fn test_into_user_drops_empty_fields() {
        let account = AccountResponse {
            local_id: "uid-1".into(),
            email: Some("a@b.c".into()),
            display_name: Some(String::new()),
            photo_url: None,
            id_token: None,
            refresh_token: None,
        };
        let user = FirebaseIdentityProvider::into_user(account, Some("tok")).unwrap();
        assert_eq!(user.display_name, None);
        assert_eq!(user.id_token, "tok");
    }
}
