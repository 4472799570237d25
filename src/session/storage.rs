//! Per-client key/value storage for session records

use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Prefix of keys holding session records
pub const SESSION_KEY_PREFIX: &str = "session_";

/// Key holding the token of the current session
pub const CURRENT_SESSION_KEY: &str = "current_session";

/// String key/value storage owned by a single client
#[derive(Debug, Default)]
pub struct LocalStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().await.insert(key.into(), value.into());
    }

    pub async fn remove(&self, key: &str) -> Option<String> {
        self.entries.write().await.remove(key)
    }

    /// All keys, in stable order
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Tokens of every stored session record
    pub async fn session_tokens(&self) -> Vec<String> {
        self.keys()
            .await
            .into_iter()
            .filter_map(|key| key.strip_prefix(SESSION_KEY_PREFIX).map(str::to_string))
            .collect()
    }
}

pub fn session_key(token: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, token)
}
