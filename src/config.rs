//! Configuration management
//!
//! Manages server, identity provider, session, cookie and model settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const FIREBASE_API_KEY_ENV: &str = "FIREBASE_API_KEY";
const FIREBASE_PROJECT_ID_ENV: &str = "FIREBASE_PROJECT_ID";
const DEEPSEEK_API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Identity provider and document store settings
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Session lifetime and watchdog settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Cookie mirroring settings
    #[serde(default)]
    pub cookies: CookieConfig,
    /// Generative model settings
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9002
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Use the hardcoded demo accounts instead of the identity provider
    #[serde(default = "default_true")]
    pub demo_mode: bool,
    /// Firebase web API key (falls back to FIREBASE_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Firebase project id (falls back to FIREBASE_PROJECT_ID)
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_identity_url")]
    pub identity_base_url: String,
    #[serde(default = "default_firestore_url")]
    pub firestore_base_url: String,
}

fn default_true() -> bool {
    true
}

fn default_identity_url() -> String {
    "https://identitytoolkit.googleapis.com/v1".to_string()
}

fn default_firestore_url() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            demo_mode: true,
            api_key: None,
            project_id: None,
            identity_base_url: default_identity_url(),
            firestore_base_url: default_firestore_url(),
        }
    }
}

impl IdentityConfig {
    /// Demo mode is forced on whenever the provider is not configured
    pub fn is_demo_mode(&self) -> bool {
        self.demo_mode || self.api_key.is_none() || self.project_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Hard session lifetime (hours)
    #[serde(default = "default_lifetime_hours")]
    pub lifetime_hours: i64,
    /// Inactivity threshold after which a session is no longer valid (minutes)
    #[serde(default = "default_inactivity_minutes")]
    pub inactivity_minutes: i64,
    /// Watchdog interval (minutes)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_minutes: u64,
    /// Secret used to sign session tokens (generated if not set)
    #[serde(default)]
    pub token_secret: Option<String>,
}

fn default_lifetime_hours() -> i64 {
    24
}

fn default_inactivity_minutes() -> i64 {
    30
}

fn default_refresh_interval() -> u64 {
    5
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_hours: default_lifetime_hours(),
            inactivity_minutes: default_inactivity_minutes(),
            refresh_interval_minutes: default_refresh_interval(),
            token_secret: None,
        }
    }
}

impl SessionConfig {
    pub fn lifetime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lifetime_hours)
    }

    pub fn inactivity(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.inactivity_minutes)
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_interval_minutes.max(1) * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    /// Max-Age for the mirrored auth cookies (seconds)
    #[serde(default = "default_max_age")]
    pub max_age_secs: i64,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_same_site")]
    pub same_site: String,
}

fn default_max_age() -> i64 {
    86_400
}

fn default_path() -> String {
    "/".to_string()
}

fn default_same_site() -> String {
    "lax".to_string()
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age(),
            path: default_path(),
            same_site: default_same_site(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint base
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// API key (falls back to DEEPSEEK_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_llm_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_llm_model() -> String {
    "deepseek-chat".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a file, writing defaults if it does not exist.
    /// Secrets missing from the file are taken from the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str::<Config>(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            let config = Config::default();
            config.save_to(path)?;
            config
        };
        config.apply_env();
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if self.identity.api_key.is_none() {
            self.identity.api_key = env_non_empty(FIREBASE_API_KEY_ENV);
        }
        if self.identity.project_id.is_none() {
            self.identity.project_id = env_non_empty(FIREBASE_PROJECT_ID_ENV);
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = env_non_empty(DEEPSEEK_API_KEY_ENV);
        }
    }

    /// Return the session signing secret, generating and persisting one when
    /// missing.
    pub fn ensure_token_secret(&mut self, path: &Path) -> Result<String> {
        if let Some(secret) = &self.session.token_secret {
            return Ok(secret.clone());
        }

        let secret = crate::session::generate_token_secret();
        self.session.token_secret = Some(secret.clone());
        self.save_to(path)?;
        Ok(secret)
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "student-portal", "student-portal")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Show current configuration
pub fn show_config(config: &Config, path: &Path) {
    println!("Config file: {}", path.display());
    println!();
    println!("Server:        http://{}:{}", config.server.host, config.server.port);
    println!(
        "Identity:      {}",
        if config.identity.is_demo_mode() { "demo accounts" } else { "Firebase" }
    );
    println!(
        "Session:       {}h lifetime, {}m inactivity, watchdog every {}m",
        config.session.lifetime_hours,
        config.session.inactivity_minutes,
        config.session.refresh_interval_minutes
    );
    println!(
        "Cookies:       Max-Age={} Path={} SameSite={}",
        config.cookies.max_age_secs, config.cookies.path, config.cookies.same_site
    );
    println!(
        "Model:         {} @ {} ({})",
        config.llm.model,
        config.llm.base_url,
        if config.llm.api_key.is_some() { "key configured" } else { "no key, flows will fall back" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_session_policy() {
        let config = Config::default();
        assert_eq!(config.session.lifetime(), chrono::Duration::hours(24));
        assert_eq!(config.session.inactivity(), chrono::Duration::minutes(30));
        assert_eq!(config.session.refresh_interval(), std::time::Duration::from_secs(300));
        assert_eq!(config.cookies.max_age_secs, 86_400);
        assert!(config.identity.is_demo_mode());
    }

    #[test]
    fn test_load_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.port, 9002);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[identity]\ndemo_mode = false\napi_key = \"k\"\nproject_id = \"p\"\n\n[session]\ninactivity_minutes = 10\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.identity.is_demo_mode());
        assert_eq!(config.session.inactivity_minutes, 10);
        assert_eq!(config.session.lifetime_hours, 24);
        assert_eq!(config.llm.model, "deepseek-chat");
    }

    #[test]
    fn test_demo_mode_forced_without_provider_credentials() {
        let identity = IdentityConfig {
            demo_mode: false,
            api_key: None,
            project_id: Some("p".into()),
            ..Default::default()
        };
        assert!(identity.is_demo_mode());
    }

    #[test]
    fn test_ensure_token_secret_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();

        let secret = config.ensure_token_secret(&path).unwrap();
        assert!(!secret.is_empty());
        assert_eq!(config.ensure_token_secret(&path).unwrap(), secret);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.session.token_secret.as_deref(), Some(secret.as_str()));
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
