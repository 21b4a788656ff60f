// Bot configuration, loaded once at startup from environment variables.

use std::env;
use tracing::Level;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub guild_id: u64,
    pub verified_role_id: u64,
    /// Channel for alerts and audit log mirrors.
    pub mod_channel_id: u64,
    /// Role pinged on alerts. `None` when unset or `0`.
    pub mod_role_id: Option<u64>,
    pub database_url: String,
    pub hcaptcha_site_key: String,
    pub hcaptcha_secret_key: String,
    /// Public base URL the verification links point at.
    pub captcha_server_url: String,
    pub port: u16,
    pub signing_secret: String,
    pub blacklist_file: String,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let id = |key: &'static str, value: String| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid(key, value))
        };

        let port = match get("PORT").or_else(|| get("CAPTCHA_SERVER_PORT")) {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid("PORT", value))?,
            None => 8080,
        };

        let log_level = match get("LOG_LEVEL") {
            Some(value) => value
                .trim()
                .parse::<Level>()
                .map_err(|_| ConfigError::Invalid("LOG_LEVEL", value))?,
            None => Level::INFO,
        };

        let mod_role_id = match get("MOD_ROLE_ID") {
            Some(value) => Some(id("MOD_ROLE_ID", value)?).filter(|id| *id != 0),
            None => None,
        };

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            guild_id: id("GUILD_ID", required("GUILD_ID")?)?,
            verified_role_id: id("VERIFIED_ROLE_ID", required("VERIFIED_ROLE_ID")?)?,
            mod_channel_id: id("MOD_CHANNEL_ID", required("MOD_CHANNEL_ID")?)?,
            mod_role_id,
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://data/moderation.db".into()),
            hcaptcha_site_key: required("HCAPTCHA_SITE_KEY")?,
            hcaptcha_secret_key: required("HCAPTCHA_SECRET_KEY")?,
            captcha_server_url: get("CAPTCHA_SERVER_URL")
                .unwrap_or_else(|| "http://localhost:8080".into()),
            port,
            signing_secret: required("SIGNING_SECRET")?,
            blacklist_file: get("BLACKLIST_FILE").unwrap_or_else(|| "blacklist.txt".into()),
            log_level,
        })
    }
}
