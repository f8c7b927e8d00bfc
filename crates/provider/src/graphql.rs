//! Kraken GraphQL client for live smart-meter telemetry (Home Mini).

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use octowatt_core::DemandReading;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ProviderError;
use crate::rest::OctopusClient;

const GQL_URL: &str = "https://api.octopus.energy/v1/graphql/";

const TOKEN_MUTATION: &str = r#"
mutation obtainKrakenToken($input: ObtainJSONWebTokenInput!) {
    obtainKrakenToken(input: $input) { token }
}
"#;

const TELEMETRY_QUERY: &str = r#"
query smartMeterTelemetry($deviceId: String!, $start: DateTime!, $end: DateTime!) {
    smartMeterTelemetry(deviceId: $deviceId, grouping: TEN_SECONDS, start: $start, end: $end) {
        readAt
        demand
        consumptionDelta
    }
}
"#;

impl OctopusClient {
    /// Exchange the REST API key for a short-lived Kraken JWT.
    pub async fn obtain_token(&self) -> Result<String, ProviderError> {
        let body = json!({
            "query": TOKEN_MUTATION,
            "variables": {"input": {"APIKey": self.api_key}},
        });
        let data = self.gql_post(body, None).await?;

        let token = data
            .pointer("/data/obtainKrakenToken/token")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Malformed("missing obtainKrakenToken.token".into()))?;
        debug!(chars = token.len(), "Obtained GraphQL token");
        Ok(token.to_string())
    }

    /// Latest demand reading from the trailing five minutes of telemetry.
    /// An empty window is normal (meter offline, data lag) and yields `None`.
    pub async fn get_live_demand(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<Option<DemandReading>, ProviderError> {
        let now = Utc::now();
        let start = now - Duration::minutes(5);

        let body = json!({
            "query": TELEMETRY_QUERY,
            "variables": {
                "deviceId": device_id,
                "start": start.to_rfc3339_opts(SecondsFormat::Secs, true),
                "end": now.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        });
        let data = self.gql_post(body, Some(token)).await?;

        let points = data
            .pointer("/data/smartMeterTelemetry")
            .ok_or_else(|| ProviderError::Malformed("missing smartMeterTelemetry".into()))?;
        latest_reading(points)
    }

    async fn gql_post(&self, body: Value, token: Option<&str>) -> Result<Value, ProviderError> {
        let mut req = self.http.post(GQL_URL).json(&body);
        if let Some(token) = token {
            req = req.header("Authorization", token);
        }
        let resp = req.send().await?;

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

        let data: Value = resp.json().await?;
        if let Some(errors) = data.get("errors").and_then(Value::as_array) {
            if let Some(first) = errors.first() {
                let message = first
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown GraphQL error");
                return Err(ProviderError::Graphql(message.to_string()));
            }
        }
        Ok(data)
    }
}

/// Extract the latest telemetry point. The API serialises numbers as JSON
/// strings, so both forms are accepted.
pub fn latest_reading(points: &Value) -> Result<Option<DemandReading>, ProviderError> {
    let points = points
        .as_array()
        .ok_or_else(|| ProviderError::Malformed("smartMeterTelemetry is not a list".into()))?;

    let Some(latest) = points.last() else {
        debug!("No live telemetry in window");
        return Ok(None);
    };

    let demand = latest
        .get("demand")
        .and_then(as_f64)
        .ok_or_else(|| ProviderError::Malformed("telemetry point without demand".into()))?;
    let read_at = latest
        .get("readAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .ok_or_else(|| ProviderError::Malformed("telemetry point without readAt".into()))?;
    let consumption_delta = latest.get("consumptionDelta").and_then(as_f64);

    Ok(Some(DemandReading {
        read_at,
        demand,
        consumption_delta,
    }))
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_latest_reading_takes_last_point() {
        let points = json!([
            {"readAt": "2024-03-01T10:00:00Z", "demand": "250.0000", "consumptionDelta": "2.0"},
            {"readAt": "2024-03-01T10:00:10Z", "demand": "1234.0000", "consumptionDelta": "3.5"}
        ]);

        let reading = latest_reading(&points).unwrap().unwrap();
        assert_eq!(reading.demand, 1234.0);
        assert_eq!(reading.consumption_delta, Some(3.5));
        assert_eq!(
            reading.read_at,
            DateTime::parse_from_rfc3339("2024-03-01T10:00:10Z")
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn test_latest_reading_accepts_numeric_demand() {
        let points = json!([
            {"readAt": "2024-03-01T10:00:00Z", "demand": 987.5, "consumptionDelta": null}
        ]);

        let reading = latest_reading(&points).unwrap().unwrap();
        assert_eq!(reading.demand, 987.5);
        assert_eq!(reading.consumption_delta, None);
    }

    #[test]
    fn test_empty_window_is_none_not_error() {
        assert_eq!(latest_reading(&json!([])).unwrap(), None);
    }

    #[test]
    fn test_non_list_payload_is_malformed() {
        let err = latest_reading(&json!(null)).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }
}
