//! FX conversion.
//!
//! Pure function of (amount, currency, base currency, rate map, rounding).
//! Same-currency conversion uses rate 1 exactly; a missing rate is a hard
//! error, never a pass-through.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;

use ff_core::amounts::RoundingSpec;
use ff_core::currency::Currency;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("FX_RATE_MISSING: {0}")]
    RateMissing(String),

    #[error("FX_RATE_INVALID: {0}")]
    RateInvalid(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Conversion {
    pub amount_converted: Decimal,
    pub fx_rate_used: Decimal,
}

/// Convert `amount_original` into the base currency and quantize.
pub fn convert_amount(
    amount_original: Decimal,
    currency_original: &Currency,
    base_currency: &str,
    rates: &BTreeMap<String, String>,
    rounding: &RoundingSpec,
) -> Result<Conversion, ConvertError> {
    let rate = if currency_original.as_str() == base_currency {
        Decimal::ONE
    } else {
        let raw = rates
            .get(currency_original.as_str())
            .ok_or_else(|| ConvertError::RateMissing(currency_original.as_str().to_string()))?;
        raw.parse::<Decimal>()
            .map_err(|_| ConvertError::RateInvalid(raw.clone()))?
    };

    Ok(Conversion {
        amount_converted: rounding.quantize(amount_original * rate),
        fx_rate_used: rate,
    })
}
