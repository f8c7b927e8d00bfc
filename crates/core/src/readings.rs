//! Meter readings: half-hourly consumption and time-valid tariff rates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One half-hourly energy reading from the smart meter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionInterval {
    /// Start of the half-hour interval (primary key in the store).
    pub interval_start: DateTime<Utc>,
    /// End of the interval.
    pub interval_end: DateTime<Utc>,
    /// Energy consumed during the interval in kWh.
    pub kwh: f64,
}

/// A tariff value valid over a half-open time range.
///
/// Unit rates (pence/kWh) and standing charges (pence/day) share this shape.
/// `valid_to = None` means the rate is open-ended (currently active).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateInterval {
    /// Start of validity (primary key in the store).
    pub valid_from: DateTime<Utc>,
    /// End of validity, exclusive. None = open-ended.
    pub valid_to: Option<DateTime<Utc>>,
    /// Value excluding VAT.
    pub value_exc_vat: f64,
    /// Value including VAT.
    pub value_inc_vat: f64,
}

impl RateInterval {
    /// Whether this rate applies at `t`: `valid_from <= t < valid_to`,
    /// always true on the upper side when open-ended.
    pub fn applies_at(&self, t: DateTime<Utc>) -> bool {
        self.valid_from <= t && self.valid_to.map_or(true, |to| t < to)
    }
}
