//! Subcommand implementations.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use octowatt_alerts::{bot, run_demand_check, BotHandler, TelegramClient};
use octowatt_core::Bucket;
use octowatt_provider::{MeterIdentity, OctopusClient};
use octowatt_store::{keys, Store};
use tracing::info;

use crate::config::Config;
use crate::output::print_table;

/// Midnight UTC `n` days ago.
pub fn days_ago(n: i64) -> DateTime<Utc> {
    let date = (Utc::now() - Duration::days(n)).date_naive();
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Accepts a bare date or a full RFC 3339 timestamp.
pub fn parse_point(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| anyhow!("invalid date '{s}' (use YYYY-MM-DD or RFC 3339)"))
}

pub fn parse_bucket(s: &str) -> Result<Bucket> {
    Bucket::parse(s).ok_or_else(|| anyhow!("invalid group '{s}' (use day, week or month)"))
}

/// Meter identity: environment wins, the settings table (written by `init`)
/// fills the gaps.
async fn resolve_identity(config: &Config, store: &Store) -> Result<MeterIdentity> {
    let mpan = match &config.mpan {
        Some(v) => Some(v.clone()),
        None => store.get_setting(keys::MPAN).await?,
    };
    let serial = match &config.serial {
        Some(v) => Some(v.clone()),
        None => store.get_setting(keys::SERIAL).await?,
    };
    let tariff_code = match &config.tariff_code {
        Some(v) => Some(v.clone()),
        None => store.get_setting(keys::TARIFF_CODE).await?,
    };

    match (mpan, serial, tariff_code) {
        (Some(mpan), Some(serial), Some(tariff_code)) => Ok(MeterIdentity {
            mpan,
            serial,
            tariff_code,
        }),
        _ => bail!(
            "Missing meter identity (OCTOWATT_MPAN, OCTOWATT_SERIAL, OCTOWATT_TARIFF_CODE)\n\
             Run 'octowatt init' or set values in .env"
        ),
    }
}

fn telegram_client(config: &Config) -> Result<Option<TelegramClient>> {
    match (&config.telegram_bot_token, &config.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Ok(Some(TelegramClient::new(token, chat_id)?)),
        _ => Ok(None),
    }
}

pub async fn cmd_init(config: &Config, store: &Store) -> Result<()> {
    let api_key = config.require_api_key()?;
    let account = config.require_account()?;
    let client = OctopusClient::new(api_key)?;

    println!("Fetching account details for {account}...");
    let identity = client.get_electricity_details(account).await?;

    println!("  MPAN:   {}", identity.mpan);
    println!("  Serial: {}", identity.serial);
    println!("  Tariff: {}", identity.tariff_code);

    store.set_setting(keys::MPAN, &identity.mpan).await?;
    store.set_setting(keys::SERIAL, &identity.serial).await?;
    store
        .set_setting(keys::TARIFF_CODE, &identity.tariff_code)
        .await?;
    println!("\nSaved meter identity to {}", config.db_path);
    Ok(())
}

pub struct SyncArgs {
    pub days: Option<i64>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

pub async fn cmd_sync(config: &Config, store: &Store, args: SyncArgs, quiet: bool) -> Result<()> {
    let api_key = config.require_api_key()?;
    let identity = resolve_identity(config, store).await?;
    let client = OctopusClient::new(api_key)?;

    let period_from = if let Some(from) = &args.from_date {
        parse_point(from)?
    } else if let Some(days) = args.days {
        days_ago(days)
    } else if let Some(resume) = store
        .last_sync("consumption")
        .await?
        .and_then(|s| s.period_to)
    {
        info!(%resume, "Resuming from last sync");
        resume
    } else {
        days_ago(30)
    };
    let period_to = match &args.to_date {
        Some(to) => parse_point(to)?,
        None => Utc::now(),
    };

    if !quiet {
        println!("Syncing from {period_from} to {period_to}");
    }

    if !quiet {
        println!("  Fetching consumption...");
    }
    let records = client
        .get_consumption(
            &identity.mpan,
            &identity.serial,
            Some(period_from),
            Some(period_to),
        )
        .await?;
    let count = store.upsert_consumption(&records).await?;
    store
        .log_sync("consumption", Some(period_from), Some(period_to), count)
        .await?;
    if !quiet {
        println!("  -> {count} consumption records");
    }

    if !quiet {
        println!("  Fetching unit rates...");
    }
    let rates = client
        .get_unit_rates(&identity.tariff_code, Some(period_from), Some(period_to))
        .await?;
    let count = store.upsert_unit_rates(&rates).await?;
    store
        .log_sync("unit_rates", Some(period_from), Some(period_to), count)
        .await?;
    if !quiet {
        println!("  -> {count} unit rate records");
    }

    if !quiet {
        println!("  Fetching standing charges...");
    }
    let charges = client
        .get_standing_charges(&identity.tariff_code, Some(period_from), Some(period_to))
        .await?;
    let count = store.upsert_standing_charges(&charges).await?;
    store
        .log_sync("standing_charges", Some(period_from), Some(period_to), count)
        .await?;
    if !quiet {
        println!("  -> {count} standing charge records");
    }

    if !quiet {
        println!("Sync complete.");
    }

    let telegram = telegram_client(config)?;
    run_demand_check(
        store,
        &client,
        telegram.as_ref(),
        config.device_id.as_deref(),
        &config.alert_defaults,
    )
    .await?;
    Ok(())
}

/// Lightweight live-demand check, safe to run from a one-minute cron.
pub async fn cmd_demand(config: &Config, store: &Store) -> Result<()> {
    let api_key = config.require_api_key()?;
    let client = OctopusClient::new(api_key)?;
    let telegram = telegram_client(config)?;

    run_demand_check(
        store,
        &client,
        telegram.as_ref(),
        config.device_id.as_deref(),
        &config.alert_defaults,
    )
    .await?;
    Ok(())
}

pub async fn cmd_usage(
    store: &Store,
    days: Option<i64>,
    group: Option<String>,
    json: bool,
) -> Result<()> {
    let from = days_ago(days.unwrap_or(7));
    let to = Utc::now();

    if let Some(group) = group {
        let bucket = parse_bucket(&group)?;
        let rows = store.consumption_grouped(from, to, bucket).await?;
        if rows.is_empty() {
            println!("No consumption data. Run 'sync' first.");
        } else if json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            print_table(
                &["period", "total_kwh", "readings"],
                &rows
                    .iter()
                    .map(|r| {
                        vec![
                            r.period.clone(),
                            format!("{:.4}", r.total_kwh),
                            r.readings.to_string(),
                        ]
                    })
                    .collect::<Vec<_>>(),
            );
        }
        return Ok(());
    }

    let rows = store.consumption_in(from, to).await?;
    if rows.is_empty() {
        println!("No consumption data. Run 'sync' first.");
    } else if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_table(
            &["interval_start", "interval_end", "kwh"],
            &rows
                .iter()
                .map(|r| {
                    vec![
                        r.interval_start.to_rfc3339(),
                        r.interval_end.to_rfc3339(),
                        format!("{:.4}", r.kwh),
                    ]
                })
                .collect::<Vec<_>>(),
        );
    }
    Ok(())
}

pub async fn cmd_rates(store: &Store, days: Option<i64>, json: bool) -> Result<()> {
    let from = days_ago(days.unwrap_or(7));
    let to = Utc::now();

    let rates = store.unit_rates_overlapping(from, to).await?;
    if rates.is_empty() {
        println!("No rate data. Run 'sync' first.");
    } else if json {
        println!("{}", serde_json::to_string_pretty(&rates)?);
    } else {
        print_table(
            &["valid_from", "valid_to", "value_exc_vat", "value_inc_vat"],
            &rates
                .iter()
                .map(|r| {
                    vec![
                        r.valid_from.to_rfc3339(),
                        r.valid_to.map(|t| t.to_rfc3339()).unwrap_or_default(),
                        format!("{:.4}", r.value_exc_vat),
                        format!("{:.4}", r.value_inc_vat),
                    ]
                })
                .collect::<Vec<_>>(),
        );
    }
    Ok(())
}

pub async fn cmd_cost(
    store: &Store,
    days: Option<i64>,
    group: Option<String>,
    json: bool,
) -> Result<()> {
    let from = days_ago(days.unwrap_or(7));
    let to = Utc::now();
    let bucket = match group {
        Some(g) => parse_bucket(&g)?,
        None => Bucket::Day,
    };

    let rows = store.cost_rows(from, to, bucket).await?;
    if rows.is_empty() {
        println!("No cost data. Run 'sync' first.");
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_table(
            &[
                "period",
                "kWh",
                "usage (p)",
                "standing (p)",
                "total (p)",
                "total (\u{a3})",
            ],
            &rows
                .iter()
                .map(|r| {
                    vec![
                        r.period.clone(),
                        format!("{:.2}", r.total_kwh),
                        format!("{:.2}", r.usage_cost_pence),
                        format!("{:.2}", r.standing_pence),
                        format!("{:.2}", r.total_pence),
                        format!("{:.2}", r.total_gbp),
                    ]
                })
                .collect::<Vec<_>>(),
        );
    }
    Ok(())
}

pub async fn cmd_export(store: &Store, output: Option<String>) -> Result<()> {
    let mut data = store.export_all().await?;
    if let Some(obj) = data.as_object_mut() {
        obj.insert("exported_at".to_string(), serde_json::json!(Utc::now()));
    }

    let path = output.unwrap_or_else(|| "octowatt_export.json".to_string());
    std::fs::write(&path, serde_json::to_string_pretty(&data)?)
        .with_context(|| format!("failed to write {path}"))?;

    println!("Exported to {path}");
    for table in ["consumption", "unit_rates", "standing_charges", "sync_log"] {
        let count = data[table].as_array().map(Vec::len).unwrap_or(0);
        println!("  {table:<17} {count} records");
    }
    Ok(())
}

/// Long-running bot loop. Returns the process exit code.
pub async fn cmd_bot(config: &Config, store: &Store) -> Result<i32> {
    let Some(telegram) = telegram_client(config)? else {
        bail!("TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must be set in .env");
    };

    let provider = match &config.api_key {
        Some(key) => Some(OctopusClient::new(key)?),
        None => None,
    };
    let handler = BotHandler::new(
        store.clone(),
        provider,
        config.device_id.clone(),
        config.alert_defaults.clone(),
    );

    println!("Bot started. Listening for Telegram commands... (Ctrl+C to stop)");

    tokio::select! {
        res = bot::run_bot(&handler, &telegram) => {
            res?;
            Ok(0)
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            bot::send_shutdown_notice(&telegram).await;
            Ok(130)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_point_accepts_bare_date() {
        let t = parse_point("2024-03-01").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_point_accepts_rfc3339() {
        let t = parse_point("2024-03-01T12:30:00Z").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-03-01T12:30:00+00:00");
    }

    #[test]
    fn test_parse_point_rejects_garbage() {
        assert!(parse_point("yesterday").is_err());
    }

    #[test]
    fn test_days_ago_is_midnight() {
        let t = days_ago(3);
        assert_eq!(t.time(), NaiveTime::MIN);
        assert!(t < Utc::now());
    }

    #[test]
    fn test_parse_bucket() {
        assert_eq!(parse_bucket("day").unwrap(), Bucket::Day);
        assert_eq!(parse_bucket("month").unwrap(), Bucket::Month);
        assert!(parse_bucket("year").is_err());
    }
}
