//! ISO 4217 currency codes.
//!
//! The engine validates against a fixed supported subset; anything outside it
//! is a canonical violation, not a soft warning.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Supported ISO 4217 codes.
pub const VALID_CURRENCIES: [&str; 16] = [
    "AUD", "CAD", "CHF", "CNY", "CZK", "DKK", "EUR", "GBP", "HUF", "JPY", "NOK", "NZD", "PLN",
    "RUB", "SEK", "USD",
];

/// A validated, uppercased ISO 4217 currency code.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Trim, uppercase, and validate a raw currency token.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.len() != 3 || !normalized.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(CoreError::InvalidCurrency(raw.to_string()));
        }
        if !VALID_CURRENCIES.contains(&normalized.as_str()) {
            return Err(CoreError::InvalidCurrency(normalized));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_uppercases() {
        assert_eq!(Currency::parse(" usd ").unwrap().as_str(), "USD");
        assert_eq!(Currency::parse("EUR").unwrap().as_str(), "EUR");
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(Currency::parse("XXX").is_err());
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("U1D").is_err());
        assert!(Currency::parse("").is_err());
    }
}
