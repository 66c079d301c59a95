//! Freightbot configuration system.
//!
//! TOML file at `~/.freightbot/config.toml`, with environment overrides for
//! deployment secrets (`FREIGHTBOT_BOT_TOKEN`, `FREIGHTBOT_DB_PATH`,
//! `FREIGHTBOT_SYNC_ENDPOINT`, `FREIGHTBOT_SYNC_API_KEY`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FreightBotError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FreightBotConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub company: CompanyConfig,
    /// Chats allowed to run operational commands like /dbstatus.
    /// Empty = everyone.
    #[serde(default)]
    pub admin_chat_ids: Vec<i64>,
}

impl FreightBotConfig {
    /// Load config from the default path, falling back to defaults when no
    /// file exists yet. Environment overrides are applied either way.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path (no env overrides).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FreightBotError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| FreightBotError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| FreightBotError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Freightbot home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".freightbot")
    }

    /// Environment variables win over the config file.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("FREIGHTBOT_BOT_TOKEN") {
            self.telegram.bot_token = token;
        } else if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Ok(path) = std::env::var("FREIGHTBOT_DB_PATH") {
            self.store.db_path = path;
        }
        if let Ok(endpoint) = std::env::var("FREIGHTBOT_SYNC_ENDPOINT") {
            self.sync.endpoint = endpoint;
        }
        if let Ok(key) = std::env::var("FREIGHTBOT_SYNC_API_KEY") {
            self.sync.api_key = key;
        }
    }

    /// Startup validation. A missing bot token is the only fatal condition;
    /// everything else degrades at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.enabled && self.telegram.bot_token.is_empty() {
            return Err(FreightBotError::Config(
                "Telegram bot token missing. Set telegram.bot_token in config.toml \
                 or the FREIGHTBOT_BOT_TOKEN environment variable."
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn bool_true() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    1
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            enabled: true,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.freightbot/freightbot.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Notification scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Scheduler cadence in seconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Delay before the first tick after startup.
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,
    /// Lead window for recipients without a custom one.
    #[serde(default = "default_lead_hours")]
    pub default_lead_hours: i64,
}

fn default_tick_interval() -> u64 {
    300
}
fn default_startup_delay() -> u64 {
    10
}
fn default_lead_hours() -> i64 {
    crate::types::DEFAULT_LEAD_HOURS
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            startup_delay_secs: default_startup_delay(),
            default_lead_hours: default_lead_hours(),
        }
    }
}

/// Upstream order-management sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
}

impl SyncConfig {
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty()
    }
}

/// Company details shown by the /contacts command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyConfig {
    #[serde(default = "default_company_name")]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub telegram: String,
}

fn default_company_name() -> String {
    "Freightbot Logistics".into()
}

impl Default for CompanyConfig {
    fn default() -> Self {
        Self {
            name: default_company_name(),
            phone: String::new(),
            email: String::new(),
            telegram: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = FreightBotConfig::default();
        assert_eq!(cfg.notify.tick_interval_secs, 300);
        assert_eq!(cfg.notify.default_lead_hours, 24);
        assert!(!cfg.sync.is_configured());
    }

    #[test]
    fn test_parse_partial_toml() {
        let cfg: FreightBotConfig = toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"

            [notify]
            tick_interval_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(cfg.telegram.bot_token, "123:abc");
        assert_eq!(cfg.notify.tick_interval_secs, 60);
        assert_eq!(cfg.notify.default_lead_hours, 24);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let cfg = FreightBotConfig::default();
        assert!(cfg.validate().is_err());
    }
}
