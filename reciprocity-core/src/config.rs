//! Runtime configuration.
//!
//! Secrets come from the environment; everything else may be set in an optional
//! TOML file (`$RECIPROCITY_CONFIG`, default `reciprocity.toml`).

use crate::{ConfigError, CoreError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_PATH_VAR: &str = "RECIPROCITY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "reciprocity.toml";

const DEFAULT_TARGET_POST_URL: &str =
    "https://bsky.app/profile/mrmoonrose.bsky.social/post/3lna2hon6ic2r";

/// Non-secret settings, all optional in the file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub target_post_url: String,
    pub utc_offset_hours: i32,
    pub feed_limit: u32,
    pub bluesky_service: String,
    pub telegram_api_base: String,
    pub between_users_secs: u64,
    pub after_reply_secs: u64,
    pub error_backoff_secs: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            target_post_url: DEFAULT_TARGET_POST_URL.to_string(),
            utc_offset_hours: 3,
            feed_limit: 20,
            bluesky_service: "https://bsky.social".to_string(),
            telegram_api_base: "https://api.telegram.org".to_string(),
            between_users_secs: 10,
            after_reply_secs: 5,
            error_backoff_secs: 60,
        }
    }
}

impl FileConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Reads the file if it exists; a missing file yields the defaults.
    pub fn from_path(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&raw)?)
    }
}

#[derive(Debug, Clone)]
pub struct BlueskyConfig {
    pub service_url: String,
    pub identifier: String,
    pub app_password: String,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: Option<String>,
    pub channel_id: Option<String>,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some() && self.channel_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingConfig {
    pub between_users: Duration,
    pub after_reply: Duration,
    pub error_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bluesky: BlueskyConfig,
    pub telegram: TelegramConfig,
    pub target_post_url: String,
    pub utc_offset_hours: i32,
    pub feed_limit: u32,
    pub pacing: PacingConfig,
}

impl AppConfig {
    /// Loads the config file named by `$RECIPROCITY_CONFIG` and overlays the
    /// process environment.
    pub fn load() -> Result<Self, CoreError> {
        let file = match std::env::var(CONFIG_PATH_VAR) {
            // An explicitly named file has to exist.
            Ok(path) if !Path::new(&path).exists() => {
                return Err(ConfigError::FileNotFound { path }.into());
            }
            Ok(path) => FileConfig::from_path(Path::new(&path))?,
            Err(_) => FileConfig::from_path(Path::new(DEFAULT_CONFIG_PATH))?,
        };
        let config = Self::from_sources(file, |key| std::env::var(key).ok())?;
        info!(
            "Configuration loaded (target: {}, utc offset: {:+}h)",
            config.target_post_url, config.utc_offset_hours
        );
        Ok(config)
    }

    pub fn from_sources<F>(file: FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            lookup(key).ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: key.to_string(),
            })
        };

        let config = Self {
            bluesky: BlueskyConfig {
                service_url: file.bluesky_service,
                identifier: required("BLUESKY_IDENTIFIER")?,
                app_password: required("BLUESKY_APP_PASSWORD")?,
            },
            telegram: TelegramConfig {
                api_base: file.telegram_api_base,
                bot_token: lookup("TELEGRAM_BOT_TOKEN"),
                channel_id: lookup("TELEGRAM_CHANNEL_ID"),
            },
            target_post_url: lookup("TARGET_POST_URL").unwrap_or(file.target_post_url),
            utc_offset_hours: file.utc_offset_hours,
            feed_limit: file.feed_limit,
            pacing: PacingConfig {
                between_users: Duration::from_secs(file.between_users_secs),
                after_reply: Duration::from_secs(file.after_reply_secs),
                error_backoff: Duration::from_secs(file.error_backoff_secs),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(-14..=14).contains(&self.utc_offset_hours) {
            return Err(ConfigError::InvalidValue {
                field: "utc_offset_hours".to_string(),
                value: self.utc_offset_hours.to_string(),
            });
        }
        if !(1..=100).contains(&self.feed_limit) {
            return Err(ConfigError::InvalidValue {
                field: "feed_limit".to_string(),
                value: self.feed_limit.to_string(),
            });
        }
        if self.target_post_url.is_empty() {
            return Err(ConfigError::MissingField {
                field: "target_post_url".to_string(),
            });
        }
        for (field, value) in [
            ("bluesky_service", &self.bluesky.service_url),
            ("telegram_api_base", &self.telegram.api_base),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}
