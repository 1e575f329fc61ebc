use std::{env, path::Path};

use config::{Config, ConfigError};
use serde::Deserialize;

fn default_port() -> u16 {
    3001
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_index() -> String {
    "emails".to_string()
}

fn default_search_node() -> String {
    "http://localhost:9200".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_node")]
    pub node: String,
    #[serde(default = "default_index")]
    pub index: String,
}

fn default_ai_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_ai_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
}

fn default_lookback_days() -> i64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Backfill cutoff: messages received within the last N days.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

fn default_imap_port() -> u16 {
    993
}

/// One mailbox credential/connection unit. Accounts come from configuration
/// only and are never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifyConfig {
    pub slack_webhook_url: Option<String>,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub search: SearchConfig,
    pub ai: AiConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            lookback_days: default_lookback_days(),
        }
    }
}

impl ServerConfig {
    /// Loads `config/config.toml` (or `$APP_DIR/config.toml`) and applies
    /// `ONEBOX__`-prefixed environment overrides, e.g. `ONEBOX__AI__API_KEY`.
    pub fn load() -> Result<Self, ConfigError> {
        let root = env::var("APP_DIR").unwrap_or_else(|_| {
            let dir = env!("CARGO_MANIFEST_DIR");
            Path::new(dir).join("config").display().to_string()
        });
        let path = format!("{root}/config.toml");

        Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::with_prefix("ONEBOX").separator("__"))
            .build()?
            .try_deserialize()
    }
}
