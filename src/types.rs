//! Shared types used across modules
//!
//! This module contains the user and session shapes that the auth,
//! session and server modules all pass around.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Role of a portal user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Student,
    Teacher,
    Admin,
}

impl UserRole {
    /// Cookie/wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Teacher => "teacher",
            UserRole::Admin => "admin",
        }
    }

    /// Parse from the wire representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "student" => Some(UserRole::Student),
            "teacher" => Some(UserRole::Teacher),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a session record as seen by the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionData {
    /// A session is valid while it has not expired and the user has been
    /// active within the inactivity window.
    pub fn is_valid_at(&self, now: DateTime<Utc>, inactivity: Duration) -> bool {
        now < self.expires_at && (now - self.last_activity) < inactivity
    }

    /// Time left until hard expiry, zero once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        let remaining = self.expires_at - now;
        if remaining < Duration::zero() {
            Duration::zero()
        } else {
            remaining
        }
    }
}

/// An authenticated portal user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    #[serde(default, rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_data: Option<SessionData>,
}

/// Partial update applied to a user's profile
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.photo_url.is_none() && self.role.is_none()
    }

    /// Whether the identity provider's own profile needs updating
    pub fn touches_provider_profile(&self) -> bool {
        self.display_name.is_some() || self.photo_url.is_some()
    }

    /// Merge into a cached user
    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.display_name {
            user.display_name = name.clone();
        }
        if let Some(photo) = &self.photo_url {
            user.photo_url = Some(photo.clone());
        }
        if let Some(role) = self.role {
            user.role = role;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_in: i64, idle_for: i64) -> (SessionData, DateTime<Utc>) {
        let now = Utc::now();
        let data = SessionData {
            user_id: "u1".to_string(),
            expires_at: now + Duration::minutes(expires_in),
            last_activity: now - Duration::minutes(idle_for),
        };
        (data, now)
    }

    #[test]
    fn test_session_valid_when_fresh() {
        let (data, now) = session(60, 1);
        assert!(data.is_valid_at(now, Duration::minutes(30)));
    }

    #[test]
    fn test_session_invalid_when_expired() {
        let (data, now) = session(-1, 0);
        assert!(!data.is_valid_at(now, Duration::minutes(30)));
    }

    #[test]
    fn test_session_invalid_when_idle_even_if_not_expired() {
        let (data, now) = session(600, 31);
        assert!(!data.is_valid_at(now, Duration::minutes(30)));
    }

    #[test]
    fn test_remaining_clamps_to_zero() {
        let (data, now) = session(-5, 0);
        assert_eq!(data.remaining_at(now), Duration::zero());

        let (data, now) = session(10, 0);
        assert_eq!(data.remaining_at(now), Duration::minutes(10));
    }

    #[test]
    fn test_role_wire_format() {
        assert_eq!(serde_json::to_string(&UserRole::Teacher).unwrap(), "\"teacher\"");
        assert_eq!(UserRole::parse("ADMIN"), Some(UserRole::Admin));
        assert_eq!(UserRole::parse("principal"), None);
    }

    #[test]
    fn test_profile_update_apply() {
        let mut user = User {
            uid: "u1".into(),
            email: "a@b.c".into(),
            display_name: "Old".into(),
            role: UserRole::Student,
            photo_url: None,
            created_at: None,
            last_login: None,
            session_data: None,
        };
        let update = ProfileUpdate {
            display_name: Some("New".into()),
            photo_url: None,
            role: None,
        };
        assert!(update.touches_provider_profile());
        update.apply_to(&mut user);
        assert_eq!(user.display_name, "New");
        assert_eq!(user.role, UserRole::Student);
    }
}
