//! Hardcoded demo accounts used when no identity provider is configured

use chrono::Utc;

use super::AuthError;
use crate::types::{User, UserRole};

/// Shared password of every demo account
pub const DEMO_PASSWORD: &str = "password123";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoAccount {
    pub uid: &'static str,
    pub email: &'static str,
    pub display_name: &'static str,
    pub role: UserRole,
}

pub const DEMO_ACCOUNTS: [DemoAccount; 3] = [
    DemoAccount {
        uid: "demo-student-1",
        email: "student@demo.com",
        display_name: "Demo Student",
        role: UserRole::Student,
    },
    DemoAccount {
        uid: "demo-teacher-1",
        email: "teacher@demo.com",
        display_name: "Demo Teacher",
        role: UserRole::Teacher,
    },
    DemoAccount {
        uid: "demo-admin-1",
        email: "admin@demo.com",
        display_name: "Demo Admin",
        role: UserRole::Admin,
    },
];

pub fn find_by_email(email: &str) -> Option<&'static DemoAccount> {
    DEMO_ACCOUNTS.iter().find(|a| a.email == email)
}

/// Check demo credentials, naming the valid accounts or password on failure
pub fn authenticate(email: &str, password: &str) -> Result<&'static DemoAccount, AuthError> {
    let account = find_by_email(email).ok_or_else(|| {
        AuthError::DemoCredentials(
            "Invalid demo credentials. Use student@demo.com, teacher@demo.com, or admin@demo.com".to_string(),
        )
    })?;

    if password != DEMO_PASSWORD {
        return Err(AuthError::DemoCredentials(
            "Invalid demo credentials. Use password123 for demo accounts.".to_string(),
        ));
    }

    Ok(account)
}

impl DemoAccount {
    pub fn to_user(&self) -> User {
        let now = Utc::now();
        User {
            uid: self.uid.to_string(),
            email: self.email.to_string(),
            display_name: self.display_name.to_string(),
            role: self.role,
            photo_url: None,
            created_at: Some(now),
            last_login: Some(now),
            session_data: None,
        }
    }
}
