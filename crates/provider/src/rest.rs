//! REST client for the public Octopus Energy API.

use chrono::{DateTime, SecondsFormat, Utc};
use octowatt_core::{extract_product_code, ConsumptionInterval, RateInterval};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;

const BASE_URL: &str = "https://api.octopus.energy/v1";

const PAGE_SIZE: u32 = 25000;

/// The meter identity needed to fetch consumption and rates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterIdentity {
    pub mpan: String,
    pub serial: String,
    pub tariff_code: String,
}

#[derive(Debug, Deserialize)]
struct Paginated<T> {
    results: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiConsumptionRow {
    consumption: f64,
    interval_start: DateTime<Utc>,
    interval_end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiRateRow {
    value_exc_vat: f64,
    value_inc_vat: f64,
    valid_from: DateTime<Utc>,
    #[serde(default)]
    valid_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct Account {
    #[serde(default)]
    properties: Vec<Property>,
}

#[derive(Debug, Deserialize)]
struct Property {
    #[serde(default)]
    electricity_meter_points: Vec<MeterPoint>,
}

#[derive(Debug, Deserialize)]
struct MeterPoint {
    #[serde(default)]
    mpan: Option<String>,
    #[serde(default)]
    meters: Vec<Meter>,
    #[serde(default)]
    agreements: Vec<Agreement>,
}

#[derive(Debug, Deserialize)]
struct Meter {
    #[serde(default)]
    serial_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Agreement {
    #[serde(default)]
    tariff_code: Option<String>,
    #[serde(default)]
    valid_from: Option<String>,
    #[serde(default)]
    valid_to: Option<String>,
}

/// Authenticated client. The API key goes in as the basic-auth username
/// with a blank password.
pub struct OctopusClient {
    pub(crate) http: reqwest::Client,
    pub(crate) api_key: String,
    base_url: String,
}

impl OctopusClient {
    pub fn new(api_key: &str) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        debug!(url, "GET");
        let resp = self
            .http
            .get(url)
            .basic_auth(&self.api_key, Some(""))
            .query(params)
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
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }

    /// Fetch every page of a paginated endpoint by following `next` URLs.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, ProviderError> {
        let mut all = Vec::new();
        let mut page: Paginated<T> = self.get_json(url, params).await?;
        loop {
            all.extend(page.results);
            match page.next {
                // The next URL already carries the query string
                Some(next) => page = self.get_json(&next, &[]).await?,
                None => break,
            }
        }
        debug!(count = all.len(), "Paginated fetch complete");
        Ok(all)
    }

    pub async fn get_account(&self, account_number: &str) -> Result<Account, ProviderError> {
        self.get_json(&format!("{}/accounts/{account_number}/", self.base_url), &[])
            .await
    }

    /// Resolve the account to the first usable electricity meter point.
    pub async fn get_electricity_details(
        &self,
        account_number: &str,
    ) -> Result<MeterIdentity, ProviderError> {
        let account = self.get_account(account_number).await?;
        select_identity(&account, Utc::now())
    }

    /// Half-hourly consumption for a meter, oldest first.
    pub async fn get_consumption(
        &self,
        mpan: &str,
        serial: &str,
        period_from: Option<DateTime<Utc>>,
        period_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ConsumptionInterval>, ProviderError> {
        let url = format!(
            "{}/electricity-meter-points/{mpan}/meters/{serial}/consumption/",
            self.base_url
        );
        let mut params = vec![
            ("page_size", PAGE_SIZE.to_string()),
            ("order_by", "period".to_string()),
        ];
        push_period(&mut params, period_from, period_to);

        let rows: Vec<ApiConsumptionRow> = self.get_paginated(&url, &params).await?;
        Ok(rows
            .into_iter()
            .map(|r| ConsumptionInterval {
                interval_start: r.interval_start,
                interval_end: r.interval_end,
                kwh: r.consumption,
            })
            .collect())
    }

    pub async fn get_unit_rates(
        &self,
        tariff_code: &str,
        period_from: Option<DateTime<Utc>>,
        period_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<RateInterval>, ProviderError> {
        self.get_rates(tariff_code, "standard-unit-rates", period_from, period_to)
            .await
    }

    pub async fn get_standing_charges(
        &self,
        tariff_code: &str,
        period_from: Option<DateTime<Utc>>,
        period_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<RateInterval>, ProviderError> {
        self.get_rates(tariff_code, "standing-charges", period_from, period_to)
            .await
    }

    async fn get_rates(
        &self,
        tariff_code: &str,
        endpoint: &str,
        period_from: Option<DateTime<Utc>>,
        period_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<RateInterval>, ProviderError> {
        let product = extract_product_code(tariff_code)?;
        let url = format!(
            "{}/products/{product}/electricity-tariffs/{tariff_code}/{endpoint}/",
            self.base_url
        );
        let mut params = vec![("page_size", PAGE_SIZE.to_string())];
        push_period(&mut params, period_from, period_to);

        let rows: Vec<ApiRateRow> = self.get_paginated(&url, &params).await?;
        Ok(rows
            .into_iter()
            .map(|r| RateInterval {
                valid_from: r.valid_from,
                valid_to: r.valid_to,
                value_exc_vat: r.value_exc_vat,
                value_inc_vat: r.value_inc_vat,
            })
            .collect())
    }
}

fn push_period(
    params: &mut Vec<(&str, String)>,
    period_from: Option<DateTime<Utc>>,
    period_to: Option<DateTime<Utc>>,
) {
    if let Some(from) = period_from {
        params.push(("period_from", iso(from)));
    }
    if let Some(to) = period_to {
        params.push(("period_to", iso(to)));
    }
}

fn iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Pick the meter point and current agreement out of an account payload.
///
/// The current agreement is the newest one (by `valid_from`) that is still
/// valid at `now`; if none qualifies the last listed agreement wins.
pub fn select_identity(
    account: &Account,
    now: DateTime<Utc>,
) -> Result<MeterIdentity, ProviderError> {
    let now_iso = iso(now);

    for prop in &account.properties {
        for mp in &prop.electricity_meter_points {
            let Some(mpan) = &mp.mpan else { continue };
            let Some(serial) = mp.meters.last().and_then(|m| m.serial_number.clone()) else {
                continue;
            };
            if mp.agreements.is_empty() {
                continue;
            }

            let mut by_newest: Vec<&Agreement> = mp.agreements.iter().collect();
            by_newest.sort_by(|a, b| b.valid_from.cmp(&a.valid_from));

            let tariff_code = by_newest
                .iter()
                .find(|ag| ag.valid_to.as_deref().map_or(true, |to| to > now_iso.as_str()))
                .and_then(|ag| ag.tariff_code.clone())
                .or_else(|| mp.agreements.last().and_then(|ag| ag.tariff_code.clone()));

            let Some(tariff_code) = tariff_code else { continue };
            return Ok(MeterIdentity {
                mpan: mpan.clone(),
                serial,
                tariff_code,
            });
        }
    }
    Err(ProviderError::NoMeterPoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn account_from(value: serde_json::Value) -> Account {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_select_identity_prefers_current_agreement() {
        let account = account_from(json!({
            "properties": [{
                "electricity_meter_points": [{
                    "mpan": "1200012345678",
                    "meters": [
                        {"serial_number": "OLD0001"},
                        {"serial_number": "21E1234567"}
                    ],
                    "agreements": [
                        {
                            "tariff_code": "E-1R-VAR-22-11-01-C",
                            "valid_from": "2022-11-01T00:00:00Z",
                            "valid_to": "2023-06-01T00:00:00Z"
                        },
                        {
                            "tariff_code": "E-1R-AGILE-FLEX-22-11-25-C",
                            "valid_from": "2023-06-01T00:00:00Z",
                            "valid_to": null
                        }
                    ]
                }]
            }]
        }));

        let identity = select_identity(&account, ts("2024-03-01T00:00:00Z")).unwrap();
        assert_eq!(identity.mpan, "1200012345678");
        // Latest listed meter is the active one
        assert_eq!(identity.serial, "21E1234567");
        assert_eq!(identity.tariff_code, "E-1R-AGILE-FLEX-22-11-25-C");
    }

    #[test]
    fn test_select_identity_falls_back_to_last_agreement() {
        // Every agreement expired; the last listed one still names the tariff
        let account = account_from(json!({
            "properties": [{
                "electricity_meter_points": [{
                    "mpan": "1200012345678",
                    "meters": [{"serial_number": "21E1234567"}],
                    "agreements": [
                        {
                            "tariff_code": "E-1R-VAR-22-11-01-C",
                            "valid_from": "2022-11-01T00:00:00Z",
                            "valid_to": "2023-06-01T00:00:00Z"
                        }
                    ]
                }]
            }]
        }));

        let identity = select_identity(&account, ts("2024-03-01T00:00:00Z")).unwrap();
        assert_eq!(identity.tariff_code, "E-1R-VAR-22-11-01-C");
    }

    #[test]
    fn test_select_identity_skips_incomplete_meter_points() {
        let account = account_from(json!({
            "properties": [{
                "electricity_meter_points": [
                    {"mpan": "1200000000000", "meters": [], "agreements": []},
                    {
                        "mpan": "1200012345678",
                        "meters": [{"serial_number": "21E1234567"}],
                        "agreements": [{
                            "tariff_code": "E-1R-VAR-22-11-01-C",
                            "valid_from": "2022-11-01T00:00:00Z",
                            "valid_to": null
                        }]
                    }
                ]
            }]
        }));

        let identity = select_identity(&account, ts("2024-03-01T00:00:00Z")).unwrap();
        assert_eq!(identity.mpan, "1200012345678");
    }

    #[test]
    fn test_select_identity_empty_account_is_an_error() {
        let account = account_from(json!({"properties": []}));
        let err = select_identity(&account, ts("2024-03-01T00:00:00Z")).unwrap_err();
        assert!(matches!(err, ProviderError::NoMeterPoints));
    }
}
