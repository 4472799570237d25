//! Identity provider abstraction

use async_trait::async_trait;

use super::AuthError;

/// A user as the identity provider sees them, with the credential obtained
/// at sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    /// Bearer token for provider and document store calls
    pub id_token: String,
    pub refresh_token: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<ProviderUser, AuthError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderUser, AuthError>;

    /// Exchange a federated (OAuth) id token, e.g. from Google
    async fn sign_in_with_idp(&self, id_token: &str, provider_id: &str) -> Result<ProviderUser, AuthError>;

    /// Set the provider-side display name and photo
    async fn update_profile(
        &self,
        user: &ProviderUser,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> Result<ProviderUser, AuthError>;

    /// End the provider session for this credential
    async fn sign_out(&self, user: &ProviderUser) -> Result<(), AuthError>;
}
