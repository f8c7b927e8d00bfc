//! Edge-triggered demand alerting.
//!
//! The decision logic is pure; [`run_demand_check`] wires it to the live
//! telemetry fetch, the mute flag, and the alert log. Only direction
//! transitions notify, and the transition is recorded only after the
//! message actually went out, so a failed send retries on the next check.

use octowatt_core::{DemandReading, Direction};
use octowatt_provider::OctopusClient;
use octowatt_store::{keys, Store};
use tracing::{debug, error, info};

use crate::telegram::TelegramClient;
use crate::AlertError;

/// Demand above this always marks the report message as high severity.
const SEVERE_DEMAND_WATTS: f64 = 3000.0;

/// Effective alerting configuration. Values set over the bot live in the
/// settings table and override these process-level defaults.
#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub alert_threshold: f64,
    pub report_enabled: bool,
    pub report_threshold: f64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            alert_threshold: 1000.0,
            report_enabled: true,
            report_threshold: 2000.0,
        }
    }
}

impl AlertSettings {
    /// Merge stored overrides on top of the given defaults.
    pub async fn load(store: &Store, defaults: &AlertSettings) -> Result<Self, AlertError> {
        Ok(Self {
            alert_threshold: store
                .get_f64(keys::ALERT_THRESHOLD)
                .await?
                .unwrap_or(defaults.alert_threshold),
            report_enabled: store
                .get_bool(keys::REPORT_DEMAND_ENABLED)
                .await?
                .unwrap_or(defaults.report_enabled),
            report_threshold: store
                .get_f64(keys::REPORT_DEMAND_THRESHOLD)
                .await?
                .unwrap_or(defaults.report_threshold),
        })
    }
}

/// What a single evaluation wants to send.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decision {
    pub report: Option<String>,
    pub transition: Option<Transition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub direction: Direction,
    pub message: String,
}

fn short_time(reading: &DemandReading) -> String {
    reading.read_at.format("%Y-%m-%dT%H:%M").to_string()
}

/// Decide what to send for one reading. Mute suppresses every outbound
/// message; the edge state is frozen while muted because nothing gets
/// recorded either.
pub fn decide(
    reading: &DemandReading,
    settings: &AlertSettings,
    muted: bool,
    last_direction: Option<Direction>,
) -> Decision {
    if muted {
        return Decision::default();
    }

    let mut decision = Decision::default();
    let demand = reading.demand;

    if settings.report_enabled && demand >= settings.report_threshold {
        let warn = if demand >= SEVERE_DEMAND_WATTS {
            "\u{26A0}\u{FE0F} "
        } else {
            ""
        };
        decision.report = Some(format!(
            "{warn}Demand: {demand:.0}W at {}",
            short_time(reading)
        ));
    }

    let direction = Direction::for_demand(demand, settings.alert_threshold);
    if last_direction == Some(direction) {
        return decision;
    }

    let (arrow, label) = match direction {
        Direction::High => ("\u{2B06}\u{FE0F}", "High"),
        Direction::Low => ("\u{2B07}\u{FE0F}", "Low"),
    };
    decision.transition = Some(Transition {
        direction,
        message: format!(
            "{arrow} {label} usage alert\nDemand: {demand:.0}W at {}\nThreshold: {:.0}W",
            short_time(reading),
            settings.alert_threshold
        ),
    });
    decision
}

/// Fetch live demand and send any due messages. Telemetry and send
/// failures are logged and swallowed so the calling command still exits
/// cleanly.
pub async fn run_demand_check(
    store: &Store,
    provider: &OctopusClient,
    telegram: Option<&TelegramClient>,
    device_id: Option<&str>,
    defaults: &AlertSettings,
) -> Result<(), AlertError> {
    let Some(telegram) = telegram else {
        return Ok(());
    };
    let Some(device_id) = device_id else {
        debug!("No telemetry device configured, skipping live demand check");
        return Ok(());
    };

    let reading = match fetch_live_demand(provider, device_id).await {
        Ok(Some(reading)) => reading,
        Ok(None) => {
            debug!("No live telemetry data available");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to get live demand: {e}");
            return Ok(());
        }
    };
    info!(
        demand = reading.demand,
        at = %short_time(&reading),
        "Live demand reading"
    );

    let settings = AlertSettings::load(store, defaults).await?;
    let muted = store.get_bool(keys::MUTED).await?.unwrap_or(false);
    if muted {
        info!("Notifications muted, skipping Telegram sends");
    }
    let last = store.last_alert().await?;
    let last_direction = last.as_ref().map(|a| a.direction);

    let decision = decide(&reading, &settings, muted, last_direction);

    if let Some(report) = &decision.report {
        if let Err(e) = telegram.send(report).await {
            error!("Failed to send demand report: {e}");
        }
    }

    if let Some(transition) = &decision.transition {
        match telegram.send(&transition.message).await {
            Ok(()) => {
                let prev = last.map(|a| a.curr_demand).unwrap_or(0.0);
                store
                    .log_alert(
                        transition.direction,
                        prev,
                        reading.demand,
                        settings.alert_threshold,
                    )
                    .await?;
            }
            Err(e) => error!("Failed to send transition alert: {e}"),
        }
    }

    Ok(())
}

async fn fetch_live_demand(
    provider: &OctopusClient,
    device_id: &str,
) -> Result<Option<DemandReading>, AlertError> {
    let token = provider.obtain_token().await?;
    Ok(provider.get_live_demand(&token, device_id).await?)
}
