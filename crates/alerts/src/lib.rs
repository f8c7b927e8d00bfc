//! Demand alerting and Telegram bot control surface.
//!
//! Three pieces:
//! - [`telegram`]: thin Bot API client (sendMessage, getUpdates, setMyCommands)
//! - [`engine`]: edge-triggered threshold alerts driven by live telemetry
//! - [`bot`]: the long-poll command loop with persisted update offset

pub mod bot;
pub mod engine;
pub mod telegram;

use octowatt_provider::ProviderError;
use octowatt_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Telegram API error (HTTP {status}): {message}")]
    Telegram { status: u16, message: String },
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub use bot::BotHandler;
pub use engine::{run_demand_check, AlertSettings};
pub use telegram::TelegramClient;
