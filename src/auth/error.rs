use thiserror::Error;

use crate::session::SessionError;
use crate::types::UserRole;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Demo-mode rejection naming the valid accounts or password
    #[error("{0}")]
    DemoCredentials(String),

    #[error("Identity provider unreachable: {0}")]
    ProviderUnavailable(String),

    #[error("Identity provider rejected the request ({code}): {message}")]
    Provider { code: String, message: String },

    #[error("No user logged in")]
    NotSignedIn,

    #[error("{0} is not available in demo mode")]
    UnsupportedInDemoMode(&'static str),

    #[error("Role '{0}' cannot be chosen at sign up")]
    InvalidRole(UserRole),

    #[error("Session store error: {0}")]
    Session(#[from] SessionError),

    #[error("Profile store error: {0}")]
    Profile(String),
}

impl AuthError {
    /// Stable machine-readable code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::DemoCredentials(_) => "INVALID_DEMO_CREDENTIALS",
            AuthError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            AuthError::Provider { .. } => "PROVIDER_ERROR",
            AuthError::NotSignedIn => "NOT_SIGNED_IN",
            AuthError::UnsupportedInDemoMode(_) => "UNSUPPORTED_IN_DEMO_MODE",
            AuthError::InvalidRole(_) => "INVALID_ROLE",
            AuthError::Session(_) => "SESSION_ERROR",
            AuthError::Profile(_) => "PROFILE_ERROR",
        }
    }

    /// Whether the caller presented bad credentials or no session
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials | AuthError::DemoCredentials(_) | AuthError::NotSignedIn
        )
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::ProviderUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_mode_message() {
        assert_eq!(
            AuthError::UnsupportedInDemoMode("Sign up").to_string(),
            "Sign up is not available in demo mode"
        );
    }

    #[test]
    fn test_unauthorized_classification() {
        assert!(AuthError::InvalidCredentials.is_unauthorized());
        assert!(AuthError::NotSignedIn.is_unauthorized());
        assert!(!AuthError::InvalidRole(UserRole::Admin).is_unauthorized());
        assert_eq!(AuthError::InvalidRole(UserRole::Admin).error_code(), "INVALID_ROLE");
    }
}
