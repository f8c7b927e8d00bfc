use octowatt_core::InvalidTariffCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("GraphQL error: {0}")]
    Graphql(String),
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    InvalidTariff(#[from] InvalidTariffCode),
    #[error("No electricity meter points found on account")]
    NoMeterPoints,
    #[error("Malformed API response: {0}")]
    Malformed(String),
}
