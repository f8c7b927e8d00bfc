//! Minimal Telegram Bot API client over plain HTTPS.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::AlertError;

/// All bot replies carry this marker so they are recognisable in the chat.
pub const REPLY_PREFIX: &str = "\u{1F419}";

const LONG_POLL_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Client bound to one bot token and one destination chat.
pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(token: &str, chat_id: &str) -> Result<Self, AlertError> {
        // No global timeout; getUpdates holds the connection open while
        // short sends get a per-request deadline.
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.token)
    }

    /// Send a plain text message to the configured chat.
    pub async fn send(&self, text: &str) -> Result<(), AlertError> {
        let resp = self
            .http
            .post(self.url("sendMessage"))
            .timeout(Duration::from_secs(10))
            .json(&json!({"chat_id": self.chat_id, "text": text}))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(AlertError::Telegram {
                status: status.as_u16(),
                message,
            });
        }
        info!(chat_id = %self.chat_id, "Telegram message sent");
        Ok(())
    }

    /// Send a bot reply, prefixed with the marker emoji.
    pub async fn reply(&self, text: &str) -> Result<(), AlertError> {
        self.send(&format!("{REPLY_PREFIX} {text}")).await
    }

    /// Long-poll for updates. Blocks up to 30 s server-side; the request
    /// deadline leaves 10 s of slack on top of that.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, AlertError> {
        let mut params = vec![("timeout", LONG_POLL_SECS.to_string())];
        if let Some(offset) = offset {
            params.push(("offset", offset.to_string()));
        }

        let resp = self
            .http
            .get(self.url("getUpdates"))
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .query(&params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(AlertError::Telegram {
                status: status.as_u16(),
                message,
            });
        }

        let data: UpdatesResponse = resp.json().await?;
        debug!(count = data.result.len(), "Fetched Telegram updates");
        Ok(data.result)
    }

    /// Register the command menu shown in the Telegram client.
    pub async fn set_my_commands(&self) -> Result<(), AlertError> {
        let commands = json!([
            {"command": "threshold", "description": "Set alert threshold (watts)"},
            {"command": "report", "description": "Set demand report threshold or disable"},
            {"command": "mute", "description": "Silence all notifications"},
            {"command": "unmute", "description": "Resume notifications"},
            {"command": "status", "description": "Show current config + live demand"},
            {"command": "help", "description": "List available commands"},
        ]);

        let resp = self
            .http
            .post(self.url("setMyCommands"))
            .timeout(Duration::from_secs(10))
            .json(&json!({"commands": commands}))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(AlertError::Telegram {
                status: status.as_u16(),
                message,
            });
        }
        info!("Registered bot command menu");
        Ok(())
    }
}
