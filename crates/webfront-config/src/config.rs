//! Configuration management.
//!
//! Values come from three layers, later layers winning: compile-time defaults
//! (`option_env!`), the JSON config file, and `WEBFRONT_*` environment
//! variables.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default Supabase URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://webfront.supabase.co",
};

/// Default Supabase publishable key (can be overridden at compile time via SUPABASE_PUBLISHABLE_KEY env var).
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str = match option_env!("SUPABASE_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "public-anon-key",
};

/// Master admin email baked in at compile time, if any.
pub const DEFAULT_MASTER_ADMIN_EMAIL: Option<&str> = option_env!("WEBFRONT_MASTER_ADMIN_EMAIL");

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Liveness bound for the first identity-state callback.
pub const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 5_000;

/// Poll interval for REST-backed live subscriptions.
pub const DEFAULT_SUBSCRIPTION_POLL_INTERVAL_MS: u64 = 2_000;

pub const DEFAULT_CHAT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_CHAT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_LOGIN_URL: &str = "https://webfront.dev/login";

/// AI chat proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Provider API key. The proxy refuses requests while this is unset.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_chat_api_url")]
    pub api_url: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_chat_model(),
            api_url: default_chat_api_url(),
        }
    }
}

/// Transactional mail settings. Without `api_url` the invitation sender runs
/// in log-only test mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_login_url")]
    pub login_url: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            from_address: default_from_address(),
            login_url: default_login_url(),
        }
    }
}

impl MailConfig {
    /// True when an outbound mail API is configured.
    pub fn is_configured(&self) -> bool {
        self.api_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// The one email address that always resolves to the admin role.
    #[serde(default = "default_master_admin_email")]
    pub master_admin_email: Option<String>,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase publishable API key (public, safe to expose).
    #[serde(default = "default_supabase_publishable_key")]
    pub supabase_publishable_key: String,
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
    #[serde(default = "default_subscription_poll_interval_ms")]
    pub subscription_poll_interval_ms: u64,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_publishable_key() -> String {
    DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string()
}

fn default_master_admin_email() -> Option<String> {
    DEFAULT_MASTER_ADMIN_EMAIL.map(|s| s.to_string())
}

fn default_resolve_timeout_ms() -> u64 {
    DEFAULT_RESOLVE_TIMEOUT_MS
}

fn default_subscription_poll_interval_ms() -> u64 {
    DEFAULT_SUBSCRIPTION_POLL_INTERVAL_MS
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_chat_api_url() -> String {
    DEFAULT_CHAT_API_URL.to_string()
}

fn default_from_address() -> String {
    "WebFront <no-reply@webfront.dev>".to_string()
}

fn default_login_url() -> String {
    DEFAULT_LOGIN_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            master_admin_email: default_master_admin_email(),
            supabase_url: default_supabase_url(),
            supabase_publishable_key: default_supabase_publishable_key(),
            resolve_timeout_ms: DEFAULT_RESOLVE_TIMEOUT_MS,
            subscription_poll_interval_ms: DEFAULT_SUBSCRIPTION_POLL_INTERVAL_MS,
            chat: ChatConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file under `paths`, falling back
    /// to defaults when the file does not exist, then apply the environment.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }

    /// Apply `WEBFRONT_*` overrides using the given variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).and_then(non_empty);

        if let Some(level) = get("WEBFRONT_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(email) = get("WEBFRONT_MASTER_ADMIN_EMAIL") {
            self.master_admin_email = Some(email);
        }
        if let Some(url) = get("WEBFRONT_SUPABASE_URL") {
            self.supabase_url = url;
        }
        if let Some(key) = get("WEBFRONT_SUPABASE_KEY") {
            self.supabase_publishable_key = key;
        }
        if let Some(ms) = get("WEBFRONT_RESOLVE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.resolve_timeout_ms = ms;
        }
        if let Some(key) = get("WEBFRONT_GEMINI_API_KEY") {
            self.chat.api_key = Some(key);
        }
        if let Some(url) = get("WEBFRONT_MAIL_API_URL") {
            self.mail.api_url = Some(url);
        }
        if let Some(key) = get("WEBFRONT_MAIL_API_KEY") {
            self.mail.api_key = Some(key);
        }
        if let Some(from) = get("WEBFRONT_MAIL_FROM") {
            self.mail.from_address = from;
        }
    }

    /// Reject values that would make the session layer misbehave.
    pub fn validate(&self) -> CoreResult<()> {
        self.supabase_url()?;
        if self.resolve_timeout_ms == 0 {
            return Err(CoreError::Config(
                "resolve_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(email) = &self.master_admin_email {
            if !email.contains('@') {
                return Err(CoreError::Config(format!(
                    "master_admin_email is not an email address: {}",
                    email
                )));
            }
        }
        Ok(())
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }

    pub fn resolve_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn subscription_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.subscription_poll_interval_ms)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
