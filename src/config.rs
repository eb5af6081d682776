use std::env;
use std::path::PathBuf;

use chrono::Duration;
use chrono_tz::Tz;
use tracing::info;

use crate::error::ConfigError;
use crate::vk_api::DEFAULT_API_URL;

const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Moscow;
const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

pub struct BotConfig {
    pub discord_token: String,
    pub vk_token: String,
    pub operator_channel_id: Option<u64>,
    pub timezone: Tz,
    pub session_ttl: Duration,
    pub report_dir: PathBuf,
    pub vk_api_url: String,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let discord_token = get("DISCORD_TOKEN").ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;
        let vk_token = get("VK_TOKEN").ok_or(ConfigError::Missing("VK_TOKEN"))?;

        let operator_channel_id = match get("OPERATOR_CHANNEL_ID") {
            Some(raw) => Some(raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                name: "OPERATOR_CHANNEL_ID",
                reason: e.to_string(),
            })?),
            None => None,
        };

        let timezone = match get("BOT_TIMEZONE") {
            Some(raw) => raw.parse::<Tz>().map_err(|e| ConfigError::Invalid {
                name: "BOT_TIMEZONE",
                reason: e.to_string(),
            })?,
            None => DEFAULT_TIMEZONE,
        };

        let ttl_minutes = match get("SESSION_TTL_MINUTES") {
            Some(raw) => raw.parse::<i64>().ok().filter(|m| *m > 0).ok_or_else(|| {
                ConfigError::Invalid {
                    name: "SESSION_TTL_MINUTES",
                    reason: format!("expected a positive number of minutes, got '{}'", raw),
                }
            })?,
            None => DEFAULT_SESSION_TTL_MINUTES,
        };

        let report_dir = get("REPORT_DIR").map(PathBuf::from).unwrap_or_else(env::temp_dir);
        let vk_api_url = get("VK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            discord_token,
            vk_token,
            operator_channel_id,
            timezone,
            session_ttl: Duration::minutes(ttl_minutes),
            report_dir,
            vk_api_url,
        })
    }

    /// Logs the effective settings without the tokens.
    pub fn log_redacted(&self) {
        info!(
            operator_channel = ?self.operator_channel_id,
            timezone = %self.timezone,
            session_ttl_minutes = self.session_ttl.num_minutes(),
            report_dir = %self.report_dir.display(),
            vk_api_url = %self.vk_api_url,
            "Configuration loaded"
        );
    }
}
