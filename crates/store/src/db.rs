//! SQLite schema and queries.

use chrono::{DateTime, SecondsFormat, Utc};
use octowatt_core::{Bucket, ConsumptionInterval, CostRow, Direction, RateInterval};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Invalid timestamp in store: {0}")]
    Timestamp(String),
    #[error("Invalid alert direction in store: {0}")]
    Direction(String),
}

/// One entry in the append-only sync log, used to resume incremental syncs.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    pub sync_type: String,
    pub synced_at: DateTime<Utc>,
    pub period_from: Option<DateTime<Utc>>,
    pub period_to: Option<DateTime<Utc>>,
    pub record_count: i64,
}

/// One entry in the append-only alert log: a threshold direction transition.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub direction: Direction,
    pub prev_demand: f64,
    pub curr_demand: f64,
    pub threshold: f64,
    pub created_at: DateTime<Utc>,
}

/// One row of grouped consumption (no cost join).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UsageRow {
    pub period: String,
    pub total_kwh: f64,
    pub readings: i64,
}

/// Encode a timestamp for storage. A single uniform format keeps the TEXT
/// columns lexicographically ordered, which the range queries rely on.
fn encode_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn decode_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp(s.to_string()))
}

/// Database connection for the tracker.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the SQLite database at the given URL, creating the file
    /// and schema if missing. Use `sqlite::memory:` in tests.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Single writer process; WAL is for crash safety, not concurrency.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create the schema. Idempotent, runs on every open.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS consumption (
                interval_start TEXT PRIMARY KEY,
                interval_end   TEXT NOT NULL,
                kwh            REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS unit_rates (
                valid_from    TEXT PRIMARY KEY,
                valid_to      TEXT,
                value_exc_vat REAL NOT NULL,
                value_inc_vat REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS standing_charges (
                valid_from    TEXT PRIMARY KEY,
                valid_to      TEXT,
                value_exc_vat REAL NOT NULL,
                value_inc_vat REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_log (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                sync_type    TEXT NOT NULL,
                synced_at    TEXT NOT NULL,
                period_from  TEXT,
                period_to    TEXT,
                record_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_log (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                direction   TEXT NOT NULL,
                prev_demand REAL NOT NULL,
                curr_demand REAL NOT NULL,
                threshold   REAL NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for idx in [
            "CREATE INDEX IF NOT EXISTS idx_consumption_start ON consumption(interval_start)",
            "CREATE INDEX IF NOT EXISTS idx_unit_rates_from ON unit_rates(valid_from)",
            "CREATE INDEX IF NOT EXISTS idx_standing_charges_from ON standing_charges(valid_from)",
            "CREATE INDEX IF NOT EXISTS idx_sync_log_type ON sync_log(sync_type)",
        ] {
            sqlx::query(idx).execute(&self.pool).await?;
        }

        debug!("Database schema initialised");
        Ok(())
    }

    // ---- Ingestion (upsert by primary key, idempotent) ----

    /// Upsert half-hourly consumption records. Returns the number written.
    pub async fn upsert_consumption(
        &self,
        records: &[ConsumptionInterval],
    ) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for rec in records {
            sqlx::query(
                "INSERT OR REPLACE INTO consumption (interval_start, interval_end, kwh) \
                 VALUES (?, ?, ?)",
            )
            .bind(encode_ts(rec.interval_start))
            .bind(encode_ts(rec.interval_end))
            .bind(rec.kwh)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(count = records.len(), "Upserted consumption records");
        Ok(records.len() as u64)
    }

    pub async fn upsert_unit_rates(&self, records: &[RateInterval]) -> Result<u64, StoreError> {
        self.upsert_rates("unit_rates", records).await
    }

    pub async fn upsert_standing_charges(
        &self,
        records: &[RateInterval],
    ) -> Result<u64, StoreError> {
        self.upsert_rates("standing_charges", records).await
    }

    async fn upsert_rates(&self, table: &str, records: &[RateInterval]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        // Table name comes from the two callers above, never user input.
        let sql = format!(
            "INSERT OR REPLACE INTO {table} (valid_from, valid_to, value_exc_vat, value_inc_vat) \
             VALUES (?, ?, ?, ?)"
        );

        let mut tx = self.pool.begin().await?;
        for rec in records {
            sqlx::query(&sql)
                .bind(encode_ts(rec.valid_from))
                .bind(rec.valid_to.map(encode_ts))
                .bind(rec.value_exc_vat)
                .bind(rec.value_inc_vat)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(count = records.len(), table, "Upserted rate records");
        Ok(records.len() as u64)
    }

    // ---- Sync log ----

    pub async fn log_sync(
        &self,
        sync_type: &str,
        period_from: Option<DateTime<Utc>>,
        period_to: Option<DateTime<Utc>>,
        record_count: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_log (sync_type, synced_at, period_from, period_to, record_count) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(sync_type)
        .bind(encode_ts(Utc::now()))
        .bind(period_from.map(encode_ts))
        .bind(period_to.map(encode_ts))
        .bind(record_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent sync of the given type, for smart resume.
    pub async fn last_sync(&self, sync_type: &str) -> Result<Option<SyncRecord>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, i64)>(
            "SELECT sync_type, synced_at, period_from, period_to, record_count \
             FROM sync_log WHERE sync_type = ? ORDER BY synced_at DESC, id DESC LIMIT 1",
        )
        .bind(sync_type)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(sync_type, synced_at, from, to, record_count)| {
            Ok(SyncRecord {
                sync_type,
                synced_at: decode_ts(&synced_at)?,
                period_from: from.as_deref().map(decode_ts).transpose()?,
                period_to: to.as_deref().map(decode_ts).transpose()?,
                record_count,
            })
        })
        .transpose()
    }

    // ---- Alert log ----

    pub async fn log_alert(
        &self,
        direction: Direction,
        prev_demand: f64,
        curr_demand: f64,
        threshold: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO alert_log (direction, prev_demand, curr_demand, threshold, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(direction.as_str())
        .bind(prev_demand)
        .bind(curr_demand)
        .bind(threshold)
        .bind(encode_ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent alert transition, if any.
    pub async fn last_alert(&self) -> Result<Option<AlertRecord>, StoreError> {
        let row = sqlx::query_as::<_, (String, f64, f64, f64, String)>(
            "SELECT direction, prev_demand, curr_demand, threshold, created_at \
             FROM alert_log ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(direction, prev_demand, curr_demand, threshold, created_at)| {
            let direction = Direction::from_str(&direction)
                .ok_or_else(|| StoreError::Direction(direction.clone()))?;
            Ok(AlertRecord {
                direction,
                prev_demand,
                curr_demand,
                threshold,
                created_at: decode_ts(&created_at)?,
            })
        })
        .transpose()
    }

    // ---- Settings (raw string access; typed wrappers in settings.rs) ----

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query_as::<_, (String,)>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_setting(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- Queries ----

    /// Raw half-hourly consumption in `[from, to)`.
    pub async fn consumption_in(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ConsumptionInterval>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, f64)>(
            "SELECT interval_start, interval_end, kwh FROM consumption \
             WHERE interval_start >= ? AND interval_start < ? ORDER BY interval_start",
        )
        .bind(encode_ts(from))
        .bind(encode_ts(to))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(start, end, kwh)| {
                Ok(ConsumptionInterval {
                    interval_start: decode_ts(&start)?,
                    interval_end: decode_ts(&end)?,
                    kwh,
                })
            })
            .collect()
    }

    /// Consumption grouped by bucket, no cost join.
    pub async fn consumption_grouped(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        bucket: Bucket,
    ) -> Result<Vec<UsageRow>, StoreError> {
        let sql = format!(
            "SELECT {expr} AS period, SUM(kwh) AS total_kwh, COUNT(*) AS readings \
             FROM consumption WHERE interval_start >= ? AND interval_start < ? \
             GROUP BY period ORDER BY period",
            expr = bucket_expr(bucket, "interval_start"),
        );

        let rows = sqlx::query_as::<_, (String, f64, i64)>(&sql)
            .bind(encode_ts(from))
            .bind(encode_ts(to))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(period, total_kwh, readings)| UsageRow {
                period,
                total_kwh,
                readings,
            })
            .collect())
    }

    pub async fn unit_rates_overlapping(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RateInterval>, StoreError> {
        self.rates_overlapping("unit_rates", from, to).await
    }

    pub async fn standing_charges_overlapping(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RateInterval>, StoreError> {
        self.rates_overlapping("standing_charges", from, to).await
    }

    async fn rates_overlapping(
        &self,
        table: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RateInterval>, StoreError> {
        let sql = format!(
            "SELECT valid_from, valid_to, value_exc_vat, value_inc_vat FROM {table} \
             WHERE valid_from < ? AND (valid_to IS NULL OR valid_to > ?) ORDER BY valid_from"
        );

        let rows = sqlx::query_as::<_, (String, Option<String>, f64, f64)>(&sql)
            .bind(encode_ts(to))
            .bind(encode_ts(from))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(valid_from, valid_to, exc, inc)| {
                Ok(RateInterval {
                    valid_from: decode_ts(&valid_from)?,
                    valid_to: valid_to.as_deref().map(decode_ts).transpose()?,
                    value_exc_vat: exc,
                    value_inc_vat: inc,
                })
            })
            .collect()
    }

    /// Standing charge (inc VAT, pence/day) applicable on a `YYYY-MM-DD` date.
    pub async fn standing_charge_for_date(&self, date: &str) -> Result<Option<f64>, StoreError> {
        let row = sqlx::query_as::<_, (f64,)>(
            "SELECT value_inc_vat FROM standing_charges \
             WHERE valid_from <= ? AND (valid_to IS NULL OR valid_to > ?) \
             ORDER BY valid_from DESC LIMIT 1",
        )
        .bind(date)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(v,)| v))
    }

    /// Per-bucket costs over `[from, to)`: consumption joined to the unit
    /// rate valid at each reading's start, plus the bucket's standing charge.
    ///
    /// Readings with no covering rate contribute 0 pence, not a dropped row.
    /// The standing charge uses the bucket's representative date (the day
    /// itself, the range start for weeks, the first of the month) times a
    /// fixed day count; see [`Bucket::standing_charge_days`].
    ///
    /// An empty range yields an empty vec, the "no data" signal.
    pub async fn cost_rows(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        bucket: Bucket,
    ) -> Result<Vec<CostRow>, StoreError> {
        let sql = format!(
            "SELECT {expr} AS period, \
                    SUM(c.kwh) AS total_kwh, \
                    COALESCE(SUM(c.kwh * r.value_inc_vat), 0.0) AS usage_cost_pence, \
                    COUNT(*) AS readings \
             FROM consumption c \
             LEFT JOIN unit_rates r ON r.valid_from <= c.interval_start \
                 AND (r.valid_to IS NULL OR r.valid_to > c.interval_start) \
             WHERE c.interval_start >= ? AND c.interval_start < ? \
             GROUP BY period ORDER BY period",
            expr = bucket_expr(bucket, "c.interval_start"),
        );

        let rows = sqlx::query_as::<_, (String, f64, f64, i64)>(&sql)
            .bind(encode_ts(from))
            .bind(encode_ts(to))
            .fetch_all(&self.pool)
            .await?;

        let range_start_date = from.format("%Y-%m-%d").to_string();
        let mut out = Vec::with_capacity(rows.len());
        for (period, total_kwh, usage_cost_pence, readings) in rows {
            let charge_date = match bucket {
                Bucket::Day => period.clone(),
                // Week buckets look up the charge on the range start, not
                // each day within the bucket.
                Bucket::Week => range_start_date.clone(),
                Bucket::Month => format!("{period}-01"),
            };
            let daily = self
                .standing_charge_for_date(&charge_date)
                .await?
                .unwrap_or(0.0);
            let standing_pence = daily * bucket.standing_charge_days();
            let total_pence = usage_cost_pence + standing_pence;

            out.push(CostRow {
                period,
                total_kwh,
                usage_cost_pence,
                standing_pence,
                total_pence,
                total_gbp: total_pence / 100.0,
                readings,
            });
        }
        Ok(out)
    }

    // ---- Export ----

    /// All data tables as JSON, for the `export` command.
    pub async fn export_all(&self) -> Result<serde_json::Value, StoreError> {
        let mut out = serde_json::Map::new();

        let consumption = sqlx::query_as::<_, (String, String, f64)>(
            "SELECT interval_start, interval_end, kwh FROM consumption ORDER BY interval_start",
        )
        .fetch_all(&self.pool)
        .await?;
        out.insert(
            "consumption".into(),
            consumption
                .into_iter()
                .map(|(start, end, kwh)| {
                    serde_json::json!({
                        "interval_start": start,
                        "interval_end": end,
                        "kwh": kwh,
                    })
                })
                .collect(),
        );

        for table in ["unit_rates", "standing_charges"] {
            let rows = sqlx::query_as::<_, (String, Option<String>, f64, f64)>(&format!(
                "SELECT valid_from, valid_to, value_exc_vat, value_inc_vat FROM {table} \
                 ORDER BY valid_from"
            ))
            .fetch_all(&self.pool)
            .await?;
            out.insert(
                table.into(),
                rows.into_iter()
                    .map(|(from, to, exc, inc)| {
                        serde_json::json!({
                            "valid_from": from,
                            "valid_to": to,
                            "value_exc_vat": exc,
                            "value_inc_vat": inc,
                        })
                    })
                    .collect(),
            );
        }

        let syncs = sqlx::query_as::<_, (i64, String, String, Option<String>, Option<String>, i64)>(
            "SELECT id, sync_type, synced_at, period_from, period_to, record_count \
             FROM sync_log ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        out.insert(
            "sync_log".into(),
            syncs
                .into_iter()
                .map(|(id, sync_type, synced_at, from, to, count)| {
                    serde_json::json!({
                        "id": id,
                        "sync_type": sync_type,
                        "synced_at": synced_at,
                        "period_from": from,
                        "period_to": to,
                        "record_count": count,
                    })
                })
                .collect(),
        );

        Ok(serde_json::Value::Object(out))
    }

    /// Row count of one of the data tables (used by tests and `export`).
    pub async fn table_count(&self, table: &str) -> Result<i64, StoreError> {
        let allowed = [
            "consumption",
            "unit_rates",
            "standing_charges",
            "sync_log",
            "alert_log",
        ];
        if !allowed.contains(&table) {
            return Ok(0);
        }
        let (count,) = sqlx::query_as::<_, (i64,)>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// SQL expression producing the group label for a bucket, matching
/// [`Bucket::label`] on the Rust side.
fn bucket_expr(bucket: Bucket, column: &str) -> String {
    match bucket {
        Bucket::Day => format!("substr({column}, 1, 10)"),
        Bucket::Week => format!("strftime('%Y-W%W', {column})"),
        Bucket::Month => format!("substr({column}, 1, 7)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn reading(start: &str, end: &str, kwh: f64) -> ConsumptionInterval {
        ConsumptionInterval {
            interval_start: ts(start),
            interval_end: ts(end),
            kwh,
        }
    }

    fn flat_rate(from: &str, inc_vat: f64) -> RateInterval {
        RateInterval {
            valid_from: ts(from),
            valid_to: None,
            value_exc_vat: inc_vat / 1.05,
            value_inc_vat: inc_vat,
        }
    }

    /// A day of half-hourly readings summing to exactly `total_kwh`.
    fn full_day(date: &str, total_kwh: f64) -> Vec<ConsumptionInterval> {
        let day_start = ts(&format!("{date}T00:00:00Z"));
        (0..48)
            .map(|i| {
                let start = day_start + chrono::Duration::minutes(30 * i);
                ConsumptionInterval {
                    interval_start: start,
                    interval_end: start + chrono::Duration::minutes(30),
                    kwh: total_kwh / 48.0,
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let records = full_day("2024-03-01", 10.0);

        store.upsert_consumption(&records).await.unwrap();
        assert_eq!(store.table_count("consumption").await.unwrap(), 48);

        // Re-running the same sync must not change row counts
        store.upsert_consumption(&records).await.unwrap();
        assert_eq!(store.table_count("consumption").await.unwrap(), 48);

        let rates = vec![flat_rate("2024-01-01T00:00:00Z", 28.0)];
        store.upsert_unit_rates(&rates).await.unwrap();
        store.upsert_unit_rates(&rates).await.unwrap();
        assert_eq!(store.table_count("unit_rates").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cost_scenario_flat_rate_and_standing_charge() {
        // 10 kWh in one day at 28.0 p/kWh inc VAT plus 45.0 p/day standing
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store
            .upsert_consumption(&full_day("2024-03-01", 10.0))
            .await
            .unwrap();
        store
            .upsert_unit_rates(&[flat_rate("2024-01-01T00:00:00Z", 28.0)])
            .await
            .unwrap();
        store
            .upsert_standing_charges(&[flat_rate("2024-01-01T00:00:00Z", 45.0)])
            .await
            .unwrap();

        let rows = store
            .cost_rows(ts("2024-03-01T00:00:00Z"), ts("2024-03-02T00:00:00Z"), Bucket::Day)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.period, "2024-03-01");
        assert!((row.total_kwh - 10.0).abs() < 1e-9);
        assert!((row.usage_cost_pence - 280.0).abs() < 1e-6);
        assert!((row.standing_pence - 45.0).abs() < 1e-9);
        assert!((row.total_pence - 325.0).abs() < 1e-6);
        assert!((row.total_gbp - 3.25).abs() < 1e-8);
        assert_eq!(row.readings, 48);
    }

    #[tokio::test]
    async fn test_missing_rate_coverage_yields_zero_not_error() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store
            .upsert_consumption(&full_day("2024-03-01", 6.0))
            .await
            .unwrap();
        // No unit rates or standing charges loaded at all

        let rows = store
            .cost_rows(ts("2024-03-01T00:00:00Z"), ts("2024-03-02T00:00:00Z"), Bucket::Day)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert!((rows[0].total_kwh - 6.0).abs() < 1e-9);
        assert_eq!(rows[0].usage_cost_pence, 0.0);
        assert_eq!(rows[0].standing_pence, 0.0);
        assert_eq!(rows[0].total_pence, 0.0);
    }

    #[tokio::test]
    async fn test_bucket_totals_partition_the_range() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let mut records = full_day("2024-03-04", 8.0);
        records.extend(full_day("2024-03-05", 12.0));
        records.extend(full_day("2024-03-06", 4.0));
        store.upsert_consumption(&records).await.unwrap();
        store
            .upsert_unit_rates(&[flat_rate("2024-01-01T00:00:00Z", 25.0)])
            .await
            .unwrap();

        let from = ts("2024-03-04T00:00:00Z");
        let to = ts("2024-03-07T00:00:00Z");

        let daily = store.cost_rows(from, to, Bucket::Day).await.unwrap();
        assert_eq!(daily.len(), 3);
        let day_usage_sum: f64 = daily.iter().map(|r| r.usage_cost_pence).sum();

        // All three days fall in the same Monday-based week
        let weekly = store.cost_rows(from, to, Bucket::Week).await.unwrap();
        assert_eq!(weekly.len(), 1);
        assert!((weekly[0].usage_cost_pence - day_usage_sum).abs() < 1e-6);
        assert!((weekly[0].total_kwh - 24.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_range_is_no_data() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let rows = store
            .cost_rows(ts("2024-03-01T00:00:00Z"), ts("2024-03-02T00:00:00Z"), Bucket::Day)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_rate_change_mid_range_joins_per_reading() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store
            .upsert_consumption(&[
                reading("2024-03-01T10:00:00Z", "2024-03-01T10:30:00Z", 1.0),
                reading("2024-03-01T12:00:00Z", "2024-03-01T12:30:00Z", 1.0),
            ])
            .await
            .unwrap();
        store
            .upsert_unit_rates(&[
                RateInterval {
                    valid_from: ts("2024-03-01T00:00:00Z"),
                    valid_to: Some(ts("2024-03-01T11:00:00Z")),
                    value_exc_vat: 9.52,
                    value_inc_vat: 10.0,
                },
                RateInterval {
                    valid_from: ts("2024-03-01T11:00:00Z"),
                    valid_to: None,
                    value_exc_vat: 19.05,
                    value_inc_vat: 20.0,
                },
            ])
            .await
            .unwrap();

        let rows = store
            .cost_rows(ts("2024-03-01T00:00:00Z"), ts("2024-03-02T00:00:00Z"), Bucket::Day)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        // 1 kWh at 10p + 1 kWh at 20p
        assert!((rows[0].usage_cost_pence - 30.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_sync_log_resume() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        assert!(store.last_sync("consumption").await.unwrap().is_none());

        store
            .log_sync(
                "consumption",
                Some(ts("2024-03-01T00:00:00Z")),
                Some(ts("2024-03-02T00:00:00Z")),
                48,
            )
            .await
            .unwrap();
        store
            .log_sync(
                "consumption",
                Some(ts("2024-03-02T00:00:00Z")),
                Some(ts("2024-03-03T00:00:00Z")),
                48,
            )
            .await
            .unwrap();

        let last = store.last_sync("consumption").await.unwrap().unwrap();
        assert_eq!(last.period_to, Some(ts("2024-03-03T00:00:00Z")));
        assert_eq!(last.record_count, 48);
        assert!(store.last_sync("unit_rates").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_alert_log_round_trip() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        assert!(store.last_alert().await.unwrap().is_none());

        store
            .log_alert(Direction::High, 800.0, 1200.0, 1000.0)
            .await
            .unwrap();
        store
            .log_alert(Direction::Low, 1200.0, 600.0, 1000.0)
            .await
            .unwrap();

        let last = store.last_alert().await.unwrap().unwrap();
        assert_eq!(last.direction, Direction::Low);
        assert_eq!(last.prev_demand, 1200.0);
        assert_eq!(last.curr_demand, 600.0);
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        assert!(store.get_setting("muted").await.unwrap().is_none());

        store.set_setting("muted", "true").await.unwrap();
        assert_eq!(
            store.get_setting("muted").await.unwrap().as_deref(),
            Some("true")
        );

        store.set_setting("muted", "false").await.unwrap();
        assert_eq!(
            store.get_setting("muted").await.unwrap().as_deref(),
            Some("false")
        );

        store.delete_setting("muted").await.unwrap();
        assert!(store.get_setting("muted").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_standing_charge_for_date_picks_latest_applicable() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store
            .upsert_standing_charges(&[
                RateInterval {
                    valid_from: ts("2024-01-01T00:00:00Z"),
                    valid_to: Some(ts("2024-03-01T00:00:00Z")),
                    value_exc_vat: 40.0,
                    value_inc_vat: 42.0,
                },
                RateInterval {
                    valid_from: ts("2024-03-01T00:00:00Z"),
                    valid_to: None,
                    value_exc_vat: 43.0,
                    value_inc_vat: 45.0,
                },
            ])
            .await
            .unwrap();

        assert_eq!(
            store.standing_charge_for_date("2024-02-15").await.unwrap(),
            Some(42.0)
        );
        assert_eq!(
            store.standing_charge_for_date("2024-03-15").await.unwrap(),
            Some(45.0)
        );
        assert_eq!(
            store.standing_charge_for_date("2023-12-15").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_export_contains_all_tables() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store
            .upsert_consumption(&[reading("2024-03-01T00:00:00Z", "2024-03-01T00:30:00Z", 0.5)])
            .await
            .unwrap();
        store.log_sync("consumption", None, None, 1).await.unwrap();

        let export = store.export_all().await.unwrap();
        assert_eq!(export["consumption"].as_array().unwrap().len(), 1);
        assert_eq!(export["unit_rates"].as_array().unwrap().len(), 0);
        assert_eq!(export["standing_charges"].as_array().unwrap().len(), 0);
        assert_eq!(export["sync_log"].as_array().unwrap().len(), 1);
    }
}
