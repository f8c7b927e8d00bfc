//! Live demand telemetry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single live-demand telemetry point from the home energy monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandReading {
    /// When the meter reported this sample.
    pub read_at: DateTime<Utc>,
    /// Instantaneous power draw in watts.
    pub demand: f64,
    /// Energy consumed since the previous sample, if reported.
    pub consumption_delta: Option<f64>,
}

/// Which side of the alert threshold a demand reading falls on.
///
/// Alerts are edge-triggered: a notification fires only when the direction
/// changes, not on every sample above the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    High,
    Low,
}

impl Direction {
    pub fn for_demand(demand: f64, threshold: f64) -> Self {
        if demand >= threshold {
            Direction::High
        } else {
            Direction::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::High => "high",
            Direction::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Direction::High),
            "low" => Some(Direction::Low),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_for_demand() {
        assert_eq!(Direction::for_demand(999.9, 1000.0), Direction::Low);
        // Threshold itself counts as high
        assert_eq!(Direction::for_demand(1000.0, 1000.0), Direction::High);
        assert_eq!(Direction::for_demand(1500.0, 1000.0), Direction::High);
    }

    #[test]
    fn test_direction_round_trip() {
        assert_eq!(Direction::from_str("high"), Some(Direction::High));
        assert_eq!(Direction::from_str("low"), Some(Direction::Low));
        assert_eq!(Direction::from_str("sideways"), None);
        assert_eq!(Direction::High.as_str(), "high");
    }
}
