//! Minimal error set for core-domain validation & parsing.

use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CoreError {
    #[error("ID_INVALID: {0}")]
    InvalidId(String),

    /// Callers must not embed the reserved separator in id components.
    #[error("ID_PART_CONTAINS_SEPARATOR: {0}")]
    IdPartContainsSeparator(String),

    #[error("CURRENCY_INVALID: {0}")]
    InvalidCurrency(String),

    #[error("AMOUNT_INVALID: {0}")]
    InvalidAmount(String),

    #[error("TIMESTAMP_INVALID: {0}")]
    InvalidTimestamp(String),

    /// Timestamps without an explicit UTC offset are rejected everywhere.
    #[error("TIMESTAMP_TZ_REQUIRED: {0}")]
    NaiveTimestamp(String),

    #[error("ROUNDING_MODE_INVALID: {0}")]
    InvalidRoundingMode(String),

    #[error("ROUNDING_QUANTUM_INVALID: {0}")]
    InvalidRoundingQuantum(String),
}
