//! Typed accessors over the `settings` key/value table.
//!
//! Runtime state that must survive restarts lives here: the alert threshold,
//! mute flag, Telegram update cursor, pending bot command, and the meter
//! identity captured by `init`.

use crate::db::{Store, StoreError};

/// Well-known settings keys. Everything that reads or writes the settings
/// table goes through these constants.
pub mod keys {
    /// "true" when outbound Telegram messages are suppressed.
    pub const MUTED: &str = "muted";
    /// Command name awaiting its argument in a follow-up message.
    pub const PENDING_COMMAND: &str = "pending_command";
    /// Last acknowledged Telegram update id plus one.
    pub const TELEGRAM_UPDATE_OFFSET: &str = "telegram_update_offset";
    /// Demand alert threshold in watts.
    pub const ALERT_THRESHOLD: &str = "alert_threshold";
    /// Demand threshold for the periodic report, in watts.
    pub const REPORT_DEMAND_THRESHOLD: &str = "report_demand_threshold";
    /// "true" when the periodic demand report is enabled.
    pub const REPORT_DEMAND_ENABLED: &str = "report_demand_enabled";
    /// Electricity meter point administration number.
    pub const MPAN: &str = "mpan";
    /// Electricity meter serial number.
    pub const SERIAL: &str = "serial";
    /// Full tariff code of the current agreement.
    pub const TARIFF_CODE: &str = "tariff_code";
}

impl Store {
    pub async fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError> {
        Ok(self.get_setting(key).await?.map(|v| v == "true"))
    }

    pub async fn set_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.set_setting(key, if value { "true" } else { "false" })
            .await
    }

    /// Missing or unparsable values read as `None`; callers supply defaults.
    pub async fn get_f64(&self, key: &str) -> Result<Option<f64>, StoreError> {
        Ok(self
            .get_setting(key)
            .await?
            .and_then(|v| v.parse::<f64>().ok()))
    }

    pub async fn set_f64(&self, key: &str, value: f64) -> Result<(), StoreError> {
        self.set_setting(key, &value.to_string()).await
    }

    pub async fn get_i64(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .get_setting(key)
            .await?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    pub async fn set_i64(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.set_setting(key, &value.to_string()).await
    }
}
