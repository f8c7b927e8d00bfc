//! Telegram bot command loop.
//!
//! Commands either execute immediately or, when an argument is missing,
//! park themselves in the `pending_command` setting so the next plain
//! message supplies the argument. Any new slash command clears the
//! pending state; last command wins.

use octowatt_provider::OctopusClient;
use octowatt_store::{keys, Store};
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::engine::AlertSettings;
use crate::telegram::TelegramClient;
use crate::AlertError;

const POLL_FAILURE_BACKOFF: Duration = Duration::from_secs(5);

/// Commands that park themselves waiting for an argument.
const PENDING_COMMANDS: [&str; 2] = ["threshold", "report"];

/// Parses commands against the store; network-free so it can be tested
/// without a Telegram connection.
pub struct BotHandler {
    store: Store,
    provider: Option<OctopusClient>,
    device_id: Option<String>,
    defaults: AlertSettings,
    build_version: String,
}

impl BotHandler {
    pub fn new(
        store: Store,
        provider: Option<OctopusClient>,
        device_id: Option<String>,
        defaults: AlertSettings,
    ) -> Self {
        Self {
            store,
            provider,
            device_id,
            defaults,
            build_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Turn an incoming message into a dispatchable command, applying the
    /// pending-argument continuation. `None` means nothing to dispatch.
    pub async fn resolve(&self, text: &str) -> Result<Option<String>, AlertError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if text.starts_with('/') {
            return Ok(Some(text.to_string()));
        }

        let pending = self
            .store
            .get_setting(keys::PENDING_COMMAND)
            .await?
            .unwrap_or_default();
        if PENDING_COMMANDS.contains(&pending.as_str()) {
            self.store.set_setting(keys::PENDING_COMMAND, "").await?;
            return Ok(Some(format!("/{pending} {text}")));
        }
        Ok(None)
    }

    /// Dispatch one command, returning the reply text.
    pub async fn handle(&self, text: &str) -> Result<String, AlertError> {
        let mut parts = text.trim().splitn(2, char::is_whitespace);
        let mut cmd = parts.next().unwrap_or("").to_lowercase();
        let arg = parts.next().unwrap_or("").trim().to_string();

        // /status@MyBot -> /status
        if let Some((bare, _)) = cmd.split_once('@') {
            cmd = bare.to_string();
        }

        // Any fresh command supersedes a parked one
        if self
            .store
            .get_setting(keys::PENDING_COMMAND)
            .await?
            .is_some_and(|p| !p.is_empty())
        {
            self.store.set_setting(keys::PENDING_COMMAND, "").await?;
        }

        match cmd.as_str() {
            "/threshold" => self.cmd_threshold(&arg).await,
            "/report" => self.cmd_report(&arg).await,
            "/mute" => {
                self.store.set_bool(keys::MUTED, true).await?;
                Ok("Notifications muted".to_string())
            }
            "/unmute" => {
                self.store.set_bool(keys::MUTED, false).await?;
                Ok("Notifications resumed".to_string())
            }
            "/status" => self.cmd_status().await,
            "/help" => Ok([
                "Available commands:",
                "  /threshold <watts> - set alert threshold",
                "  /report <watts|off> - set demand report threshold or disable",
                "  /mute - silence all notifications",
                "  /unmute - resume notifications",
                "  /status - show current config + live demand",
                "  /help - show this message",
            ]
            .join("\n")),
            _ => Ok("Unknown command. Send /help for usage.".to_string()),
        }
    }

    async fn cmd_threshold(&self, arg: &str) -> Result<String, AlertError> {
        if arg.is_empty() {
            self.store
                .set_setting(keys::PENDING_COMMAND, "threshold")
                .await?;
            return Ok("Enter threshold in watts:".to_string());
        }
        let Ok(watts) = arg.parse::<i64>() else {
            return Ok("Invalid number. Usage: /threshold <watts>".to_string());
        };
        self.store.set_f64(keys::ALERT_THRESHOLD, watts as f64).await?;
        Ok(format!("Alert threshold set to {watts}W"))
    }

    async fn cmd_report(&self, arg: &str) -> Result<String, AlertError> {
        if arg.is_empty() {
            self.store
                .set_setting(keys::PENDING_COMMAND, "report")
                .await?;
            return Ok("Enter threshold in watts (or 'off'):".to_string());
        }
        if arg.eq_ignore_ascii_case("off") {
            self.store
                .set_bool(keys::REPORT_DEMAND_ENABLED, false)
                .await?;
            return Ok("Demand reporting disabled".to_string());
        }
        let Ok(watts) = arg.parse::<i64>() else {
            return Ok("Invalid value. Usage: /report <watts|off>".to_string());
        };
        self.store
            .set_f64(keys::REPORT_DEMAND_THRESHOLD, watts as f64)
            .await?;
        self.store
            .set_bool(keys::REPORT_DEMAND_ENABLED, true)
            .await?;
        Ok(format!("Demand reporting enabled at {watts}W threshold"))
    }

    async fn cmd_status(&self) -> Result<String, AlertError> {
        let settings = AlertSettings::load(&self.store, &self.defaults).await?;
        let muted = self.store.get_bool(keys::MUTED).await?.unwrap_or(false);

        let mut lines = vec![
            "Current config:".to_string(),
            format!("  Alert threshold: {:.0}W", settings.alert_threshold),
            format!(
                "  Report demand: {}",
                if settings.report_enabled { "on" } else { "off" }
            ),
            format!("  Report threshold: {:.0}W", settings.report_threshold),
            format!("  Muted: {}", if muted { "yes" } else { "no" }),
        ];

        if let (Some(provider), Some(device_id)) = (&self.provider, &self.device_id) {
            match live_demand_line(provider, device_id).await {
                Ok(Some(line)) => lines.push(line),
                Ok(None) => {}
                Err(e) => warn!("Failed to fetch demand for /status: {e}"),
            }
        }

        if let Some(cron) = crontab_lines().await {
            if !cron.is_empty() {
                lines.push("Cron jobs:".to_string());
                for entry in cron {
                    lines.push(format!("  {entry}"));
                }
            }
        }

        lines.push(format!("Version: {}", self.build_version));
        Ok(lines.join("\n"))
    }
}

async fn live_demand_line(
    provider: &OctopusClient,
    device_id: &str,
) -> Result<Option<String>, AlertError> {
    let token = provider.obtain_token().await?;
    let reading = provider.get_live_demand(&token, device_id).await?;
    Ok(reading.map(|r| {
        format!(
            "  Live demand: {:.0}W at {}",
            r.demand,
            r.read_at.format("%Y-%m-%dT%H:%M")
        )
    }))
}

/// Scheduled jobs mentioning this binary, best effort. `None` when crontab
/// is unavailable.
async fn crontab_lines() -> Option<Vec<String>> {
    let output = Command::new("crontab").arg("-l").output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Some(
        text.lines()
            .map(str::trim)
            .filter(|l| l.contains("octowatt") && !l.starts_with('#'))
            .map(str::to_string)
            .collect(),
    )
}

/// Long-poll loop. Runs until the poll future is dropped (the caller races
/// it against the interrupt signal) or the store fails.
pub async fn run_bot(
    handler: &BotHandler,
    telegram: &TelegramClient,
) -> Result<(), AlertError> {
    if let Err(e) = telegram.set_my_commands().await {
        warn!("Failed to register bot commands: {e}");
    }

    let mut offset = handler.store.get_i64(keys::TELEGRAM_UPDATE_OFFSET).await?;
    info!(?offset, "Bot started, listening for commands");

    if let Err(e) = telegram
        .reply(&format!("Bot online (v{})", handler.build_version))
        .await
    {
        warn!("Failed to send startup banner: {e}");
    }

    loop {
        let updates = match telegram.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                error!("Failed to get updates: {e}");
                tokio::time::sleep(POLL_FAILURE_BACKOFF).await;
                continue;
            }
        };
        let got_updates = !updates.is_empty();

        for update in updates {
            offset = Some(update.update_id + 1);

            let Some(message) = update.message else { continue };
            let chat_id = message.chat.id.to_string();
            if chat_id != telegram.chat_id() {
                warn!(%chat_id, "Ignoring message from unauthorized chat");
                continue;
            }
            let Some(text) = message.text else { continue };

            let Some(command) = handler.resolve(&text).await? else {
                continue;
            };
            info!(%command, "Received command");

            match handler.handle(&command).await {
                Ok(reply) => {
                    if let Err(e) = telegram.reply(&reply).await {
                        error!("Failed to send reply: {e}");
                    }
                }
                Err(e) => error!("Failed to handle command: {e}"),
            }
        }

        if got_updates {
            if let Some(offset) = offset {
                handler
                    .store
                    .set_i64(keys::TELEGRAM_UPDATE_OFFSET, offset)
                    .await?;
            }
        }
    }
}

/// Best-effort shutdown notice for the clean-exit path.
pub async fn send_shutdown_notice(telegram: &TelegramClient) {
    if let Err(e) = telegram.reply("Bot shutting down").await {
        warn!("Failed to send shutdown notice: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn handler() -> BotHandler {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        BotHandler::new(store, None, None, AlertSettings::default())
    }

    #[tokio::test]
    async fn test_threshold_with_argument() {
        let h = handler().await;
        let reply = h.handle("/threshold 1500").await.unwrap();
        assert_eq!(reply, "Alert threshold set to 1500W");
        assert_eq!(
            h.store.get_f64(keys::ALERT_THRESHOLD).await.unwrap(),
            Some(1500.0)
        );
    }

    #[tokio::test]
    async fn test_pending_continuation_matches_direct_form() {
        let h = handler().await;

        let prompt = h.handle("/threshold").await.unwrap();
        assert_eq!(prompt, "Enter threshold in watts:");

        // The next plain message is re-dispatched as the parked command
        let resolved = h.resolve("1500").await.unwrap();
        assert_eq!(resolved.as_deref(), Some("/threshold 1500"));

        let reply = h.handle(&resolved.unwrap()).await.unwrap();
        assert_eq!(reply, "Alert threshold set to 1500W");
        assert_eq!(
            h.store.get_f64(keys::ALERT_THRESHOLD).await.unwrap(),
            Some(1500.0)
        );
    }

    #[tokio::test]
    async fn test_new_command_clears_pending_state() {
        let h = handler().await;
        h.handle("/threshold").await.unwrap();
        h.handle("/mute").await.unwrap();

        // The parked /threshold is gone; plain text no longer dispatches
        assert_eq!(h.resolve("1500").await.unwrap(), None);
        assert_eq!(h.store.get_bool(keys::MUTED).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_plain_text_without_pending_is_ignored() {
        let h = handler().await;
        assert_eq!(h.resolve("hello there").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_threshold_argument() {
        let h = handler().await;
        let reply = h.handle("/threshold lots").await.unwrap();
        assert_eq!(reply, "Invalid number. Usage: /threshold <watts>");
        assert_eq!(h.store.get_f64(keys::ALERT_THRESHOLD).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_report_off_and_on() {
        let h = handler().await;

        let reply = h.handle("/report off").await.unwrap();
        assert_eq!(reply, "Demand reporting disabled");
        assert_eq!(
            h.store.get_bool(keys::REPORT_DEMAND_ENABLED).await.unwrap(),
            Some(false)
        );

        let reply = h.handle("/report 2500").await.unwrap();
        assert_eq!(reply, "Demand reporting enabled at 2500W threshold");
        assert_eq!(
            h.store.get_bool(keys::REPORT_DEMAND_ENABLED).await.unwrap(),
            Some(true)
        );
        assert_eq!(
            h.store.get_f64(keys::REPORT_DEMAND_THRESHOLD).await.unwrap(),
            Some(2500.0)
        );
    }

    #[tokio::test]
    async fn test_mute_unmute_round_trip() {
        let h = handler().await;
        h.handle("/mute").await.unwrap();
        assert_eq!(h.store.get_bool(keys::MUTED).await.unwrap(), Some(true));
        h.handle("/unmute").await.unwrap();
        assert_eq!(h.store.get_bool(keys::MUTED).await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_botname_suffix_is_stripped() {
        let h = handler().await;
        let reply = h.handle("/mute@OctowattBot").await.unwrap();
        assert_eq!(reply, "Notifications muted");
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let h = handler().await;
        let reply = h.handle("/frobnicate").await.unwrap();
        assert_eq!(reply, "Unknown command. Send /help for usage.");
    }

    #[tokio::test]
    async fn test_status_reflects_settings() {
        let h = handler().await;
        h.handle("/threshold 1200").await.unwrap();
        h.handle("/mute").await.unwrap();

        let status = h.handle("/status").await.unwrap();
        assert!(status.contains("Alert threshold: 1200W"));
        assert!(status.contains("Muted: yes"));
        assert!(status.contains("Version:"));
    }
}
