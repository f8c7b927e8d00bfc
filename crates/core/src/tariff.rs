//! Tariff code validation and product code extraction.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot extract product code from tariff: {0}")]
pub struct InvalidTariffCode(pub String);

/// Extract the product code from a full tariff code.
///
/// Tariff codes look like `E-1R-AGILE-FLEX-22-11-25-C`: fuel (`E` or `G`),
/// rate structure (`1R` or `2R`), product code, then a single region letter
/// `A`-`P`. The product code for `E-1R-AGILE-FLEX-22-11-25-C` is
/// `AGILE-FLEX-22-11-25`.
pub fn extract_product_code(tariff_code: &str) -> Result<String, InvalidTariffCode> {
    let invalid = || InvalidTariffCode(tariff_code.to_string());

    let rest = tariff_code
        .strip_prefix("E-")
        .or_else(|| tariff_code.strip_prefix("G-"))
        .ok_or_else(invalid)?;
    let rest = rest
        .strip_prefix("1R-")
        .or_else(|| rest.strip_prefix("2R-"))
        .ok_or_else(invalid)?;

    // Region suffix: "-<letter A..P>"
    let (product, region) = rest.rsplit_once('-').ok_or_else(invalid)?;
    let mut chars = region.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() && c <= 'P' => {}
        _ => return Err(invalid()),
    }
    if product.is_empty() {
        return Err(invalid());
    }

    Ok(product.to_string())
}
