//! Octopus Energy API client.
//!
//! Two surfaces share one authenticated HTTP client:
//! - the public REST API (account details, half-hourly consumption, tariff
//!   rates) with cursor-based pagination
//! - the Kraken GraphQL API for live smart-meter telemetry, which needs a
//!   short-lived JWT obtained from the same API key

pub mod error;
pub mod graphql;
pub mod rest;

pub use error::ProviderError;
pub use rest::{MeterIdentity, OctopusClient};
