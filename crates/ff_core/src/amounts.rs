//! Exact decimal helpers.
//!
//! All money math is `rust_decimal::Decimal`; floats never enter these paths.
//! Quantization takes an explicit mode and quantum; the quantum's scale drives
//! the target precision (mirrors decimal quantize semantics).

use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::records::Direction;

/// Closed set of supported rounding modes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// Round to nearest; ties away from zero.
    HalfUp,
}

impl RoundingMode {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim() {
            "half_up" | "ROUND_HALF_UP" => Ok(Self::HalfUp),
            other => Err(CoreError::InvalidRoundingMode(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HalfUp => "half_up",
        }
    }

    fn strategy(&self) -> RoundingStrategy {
        match self {
            Self::HalfUp => RoundingStrategy::MidpointAwayFromZero,
        }
    }
}

/// Rounding mode + quantum pair; both are required wherever conversion happens.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoundingSpec {
    pub mode: RoundingMode,
    pub quantum: Decimal,
}

impl RoundingSpec {
    /// Build from the textual parameters (`"half_up"`, `"0.01"`).
    pub fn parse(mode: &str, quantum: &str) -> Result<Self, CoreError> {
        let mode = RoundingMode::parse(mode)?;
        let quantum = parse_decimal(quantum)
            .map_err(|_| CoreError::InvalidRoundingQuantum(quantum.to_string()))?;
        if quantum <= Decimal::ZERO {
            return Err(CoreError::InvalidRoundingQuantum(quantum.to_string()));
        }
        Ok(Self { mode, quantum })
    }

    /// Quantize `amount` to the quantum's scale under the declared mode. The
    /// result carries exactly that scale, padding zeros where needed.
    pub fn quantize(&self, amount: Decimal) -> Decimal {
        let scale = self.quantum.scale();
        let mut out = amount.round_dp_with_strategy(scale, self.mode.strategy());
        out.rescale(scale);
        out
    }

    /// Echo of the quantum exactly as written (evidence carries it verbatim).
    pub fn quantum_str(&self) -> String {
        format_plain(&self.quantum)
    }
}

/// Parse an exact decimal from its string form.
pub fn parse_decimal(raw: &str) -> Result<Decimal, CoreError> {
    Decimal::from_str(raw.trim()).map_err(|_| CoreError::InvalidAmount(raw.to_string()))
}

/// Plain (non-scientific) decimal rendering; scale is preserved.
pub fn format_plain(d: &Decimal) -> String {
    d.to_string()
}

/// Deterministic signed amount: debit positive, credit negative. This is the
/// single accounting convention the engine enforces.
pub fn signed_amount(direction: Direction, amount: Decimal) -> Decimal {
    match direction {
        Direction::Debit => amount,
        Direction::Credit => -amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        parse_decimal(s).unwrap()
    }

    #[test]
    fn quantize_half_up_ties_away_from_zero() {
        let spec = RoundingSpec::parse("half_up", "0.01").unwrap();
        assert_eq!(spec.quantize(dec("1.005")), dec("1.01"));
        assert_eq!(spec.quantize(dec("-1.005")), dec("-1.01"));
        assert_eq!(spec.quantize(dec("1.004")), dec("1.00"));
    }

    #[test]
    fn quantum_scale_drives_precision() {
        let spec = RoundingSpec::parse("ROUND_HALF_UP", "0.001").unwrap();
        assert_eq!(spec.quantize(dec("2.00049")), dec("2.000"));
        assert_eq!(spec.quantize(dec("2.0005")), dec("2.001"));
    }

    #[test]
    fn bad_mode_and_quantum_are_rejected() {
        assert!(RoundingSpec::parse("banker", "0.01").is_err());
        assert!(RoundingSpec::parse("half_up", "zero").is_err());
        assert!(RoundingSpec::parse("half_up", "0").is_err());
        assert!(RoundingSpec::parse("half_up", "-0.01").is_err());
    }

    #[test]
    fn quantize_pads_to_the_quantum_scale() {
        let spec = RoundingSpec::parse("half_up", "0.01").unwrap();
        assert_eq!(spec.quantize(dec("100")).to_string(), "100.00");
        assert_eq!(spec.quantize(dec("7.5")).to_string(), "7.50");
    }

    #[test]
    fn signed_convention() {
        assert_eq!(signed_amount(Direction::Debit, dec("10")), dec("10"));
        assert_eq!(signed_amount(Direction::Credit, dec("10")), dec("-10"));
    }

    #[test]
    fn plain_formatting_preserves_scale() {
        assert_eq!(format_plain(&dec("1.00")), "1.00");
        assert_eq!(format_plain(&dec("0.9100")), "0.9100");
    }
}
