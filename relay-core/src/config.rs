use crate::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "relay.toml";

const DEFAULT_USER_AGENT: &str = "RedditTelegramBot/1.0";
const DEFAULT_DATABASE_URL: &str = "sqlite://reddit_bot.db";
const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8888";
const DEFAULT_FETCH_LIMIT: u32 = 50;
// Reddit caps listing pages at 100 items
const MAX_FETCH_LIMIT: u32 = 100;

/// Non-secret settings that may live in a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub reddit_user_agent: Option<String>,
    pub telegram_channel_id: Option<String>,
    pub database_url: Option<String>,
    pub download_dir: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub fetch_limit: Option<u32>,
}

impl FileSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml_str(&content)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub reddit_client_id: String,
    pub reddit_client_secret: String,
    pub reddit_user_agent: String,
    pub telegram_bot_token: String,
    pub telegram_channel_id: String,
    pub database_url: String,
    pub download_dir: PathBuf,
    pub bind_addr: String,
    pub fetch_limit: u32,
}

impl AppConfig {
    /// Loads `.env`, the optional TOML file, then the process environment.
    ///
    /// Lookup order for the file:
    /// 1) $RELAY_CONFIG
    /// 2) relay.toml in the working directory, if present
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let file = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) => FileSettings::from_path(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                FileSettings::from_path(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => FileSettings::default(),
        };

        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Environment values win over file values.
    pub fn from_sources<F>(file: FileSettings, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        let mut required = |key: &str, fallback: Option<String>| {
            lookup(key).or(fallback).unwrap_or_else(|| {
                missing.push(key.to_string());
                String::new()
            })
        };

        let reddit_client_id = required("REDDIT_CLIENT_ID", None);
        let reddit_client_secret = required("REDDIT_CLIENT_SECRET", None);
        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN", None);
        let telegram_channel_id =
            required("TELEGRAM_CHANNEL_ID", file.telegram_channel_id.clone());

        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: missing.join(", "),
            });
        }

        let fetch_limit = match lookup("FETCH_LIMIT") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                field: "FETCH_LIMIT".to_string(),
                value: raw.clone(),
            })?,
            None => file.fetch_limit.unwrap_or(DEFAULT_FETCH_LIMIT),
        };
        if fetch_limit == 0 || fetch_limit > MAX_FETCH_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "FETCH_LIMIT".to_string(),
                value: fetch_limit.to_string(),
            });
        }

        Ok(Self {
            reddit_client_id,
            reddit_client_secret,
            reddit_user_agent: lookup("REDDIT_USER_AGENT")
                .or(file.reddit_user_agent)
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            telegram_bot_token,
            telegram_channel_id,
            database_url: lookup("DATABASE_URL")
                .or(file.database_url)
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            download_dir: lookup("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .or(file.download_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            bind_addr: lookup("BIND_ADDR")
                .or(file.bind_addr)
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            fetch_limit,
        })
    }

    pub fn log_redacted(&self) {
        info!(
            reddit_client_id = %self.reddit_client_id,
            reddit_client_secret = "********",
            reddit_user_agent = %self.reddit_user_agent,
            telegram_bot_token = "********",
            telegram_channel_id = %self.telegram_channel_id,
            database_url = %self.database_url,
            download_dir = %self.download_dir.display(),
            bind_addr = %self.bind_addr,
            fetch_limit = self.fetch_limit,
            "Loaded configuration"
        );
    }
}
