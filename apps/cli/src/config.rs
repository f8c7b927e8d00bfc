//! Environment-driven configuration.
//!
//! Credentials and identity come from `.env` / environment variables.
//! Values the bot can change at runtime (thresholds, mute, report flag)
//! only get their defaults here; the live values sit in the store's
//! settings table.

use anyhow::bail;
use octowatt_alerts::AlertSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub account: Option<String>,
    pub mpan: Option<String>,
    pub serial: Option<String>,
    pub tariff_code: Option<String>,
    pub db_path: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub device_id: Option<String>,
    pub alert_defaults: AlertSettings,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env(db_override: Option<&str>) -> Self {
        let base = AlertSettings::default();
        let alert_defaults = AlertSettings {
            alert_threshold: env_opt("OCTOWATT_ALERT_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.alert_threshold),
            report_enabled: env_opt("TELEGRAM_REPORT_DEMAND")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(base.report_enabled),
            report_threshold: env_opt("OCTOWATT_REPORT_DEMAND_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.report_threshold),
        };

        Self {
            api_key: env_opt("OCTOWATT_API_KEY"),
            account: env_opt("OCTOWATT_ACCOUNT"),
            mpan: env_opt("OCTOWATT_MPAN"),
            serial: env_opt("OCTOWATT_SERIAL"),
            tariff_code: env_opt("OCTOWATT_TARIFF_CODE"),
            db_path: db_override
                .map(str::to_string)
                .or_else(|| env_opt("OCTOWATT_DB_PATH"))
                .unwrap_or_else(|| "octowatt.db".to_string()),
            telegram_bot_token: env_opt("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: env_opt("TELEGRAM_CHAT_ID"),
            device_id: env_opt("OCTOWATT_DEVICE_ID"),
            alert_defaults,
        }
    }

    pub fn require_api_key(&self) -> anyhow::Result<&str> {
        match &self.api_key {
            Some(key) => Ok(key),
            None => bail!(
                "Missing config: OCTOWATT_API_KEY\nSet it in .env or the environment"
            ),
        }
    }

    pub fn require_account(&self) -> anyhow::Result<&str> {
        match &self.account {
            Some(account) => Ok(account),
            None => bail!(
                "Missing config: OCTOWATT_ACCOUNT\nSet it in .env or the environment"
            ),
        }
    }
}
