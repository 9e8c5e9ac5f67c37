//! Money-string parsing shared by `ServerScheme::parse_price` implementations.

use rust_decimal::Decimal;
use std::str::FromStr;

/// An amount paired with the asset it denominates and optional scheme-specific
/// metadata, as returned by `ServerScheme::parse_price`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetAmount {
    /// Atomic-unit amount, as a non-negative decimal integer string.
    pub amount: String,
    /// Scheme-specific asset identifier (contract address, mint, symbol...).
    pub asset: String,
}

impl AssetAmount {
    /// Builds an `AssetAmount` from an atomic amount and asset identifier.
    pub fn new(amount: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            asset: asset.into(),
        }
    }
}

/// Raised when a price string cannot be parsed as a fiat amount.
#[derive(Debug, thiserror::Error)]
pub enum PriceParseError {
    /// Not a recognized fiat price (must start with `$`).
    #[error("unrecognized price format: {0}")]
    UnrecognizedFormat(String),
    /// The numeric portion did not parse as a decimal.
    #[error("invalid decimal amount: {0}")]
    InvalidDecimal(#[from] rust_decimal::Error),
    /// The amount was negative.
    #[error("amount must be non-negative, got {0}")]
    Negative(Decimal),
}

/// Parses a `"$0.001"`-style fiat price string into atomic units of an asset
/// with `decimals` decimal places.
///
/// # Errors
///
/// Returns [`PriceParseError`] if the string is not `$`-prefixed, does not
/// parse as a decimal, or is negative.
pub fn parse_fiat_price(price: &str, decimals: u32) -> Result<u128, PriceParseError> {
    let numeric = price
        .strip_prefix('$')
        .ok_or_else(|| PriceParseError::UnrecognizedFormat(price.to_string()))?;
    let decimal = Decimal::from_str(numeric)?;
    if decimal.is_sign_negative() {
        return Err(PriceParseError::Negative(decimal));
    }
    let scaled = decimal * Decimal::from(10u64.pow(decimals));
    // Round rather than truncate so `$0.0000005` at 6 decimals rounds to 1 unit.
    let rounded = scaled.round();
    Ok(rounded.mantissa().unsigned_abs())
}

/// Parses an atomic-unit amount string (as carried in `PaymentRequirements.amount`)
/// into a `u128`, rejecting non-numeric or negative values.
///
/// # Errors
///
/// Returns an error if `amount` is not a valid non-negative base-10 integer.
pub fn parse_atomic_amount(amount: &str) -> Result<u128, std::num::ParseIntError> {
    amount.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fiat_price_whole_dollar() {
        assert_eq!(parse_fiat_price("$1", 6).unwrap(), 1_000_000);
    }

    #[test]
    fn test_parse_fiat_price_fractional() {
        assert_eq!(parse_fiat_price("$0.001", 6).unwrap(), 1_000);
    }

    #[test]
    fn test_parse_fiat_price_rejects_unprefixed() {
        assert!(parse_fiat_price("1.00", 6).is_err());
    }

    #[test]
    fn test_parse_fiat_price_rejects_negative() {
        assert!(parse_fiat_price("-$1", 6).is_err());
    }

    #[test]
    fn test_parse_atomic_amount() {
        assert_eq!(parse_atomic_amount("1000").unwrap(), 1000);
        assert!(parse_atomic_amount("-1").is_err());
        assert!(parse_atomic_amount("abc").is_err());
    }
}
