//! FX artifact payloads.
//!
//! The payload is canonicalized before hashing: base currency uppercased and
//! length-checked, every rate currency validated against the fixed ISO 4217
//! set, rate values parsed as exact decimals (> 0) and re-formatted in plain
//! notation, the rate map rewritten in lexicographic currency order. The
//! canonical JSON bytes are what gets stored; their SHA-256 is the checksum.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use jsonschema::{Draft, JSONSchema};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use ff_core::amounts::format_plain;
use ff_core::currency::Currency;
use ff_core::DatasetVersionId;

use crate::canonical_json::to_canonical_bytes;
use crate::hasher::sha256_hex;

#[derive(Debug, Error)]
pub enum FxError {
    #[error("BASE_CURRENCY_REQUIRED")]
    BaseCurrencyRequired,

    #[error("BASE_CURRENCY_INVALID: {0}")]
    BaseCurrencyInvalid(String),

    #[error("EFFECTIVE_DATE_REQUIRED")]
    EffectiveDateRequired,

    #[error("RATES_REQUIRED")]
    RatesRequired,

    #[error("RATE_CURRENCY_INVALID: {0}")]
    RateCurrencyInvalid(String),

    #[error("RATE_DECIMAL_INVALID: {0}")]
    RateDecimalInvalid(String),

    #[error("RATE_NON_POSITIVE: {0}")]
    RateNonPositive(String),

    #[error("FX_PAYLOAD_SCHEMA_INVALID: {0}")]
    PayloadSchema(String),

    #[error("FX_PAYLOAD_PARSE_FAILED: {0}")]
    PayloadParse(String),
}

/// Canonical FX payload; `BTreeMap` keeps the rate map sorted by currency.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FxPayload {
    pub base_currency: String,
    pub effective_date: String,
    pub rates: BTreeMap<String, String>,
}

impl FxPayload {
    /// Rate for `currency`, parsed as an exact decimal.
    pub fn rate(&self, currency: &Currency) -> Option<Decimal> {
        self.rates
            .get(currency.as_str())
            .and_then(|raw| raw.parse::<Decimal>().ok())
    }
}

/// Canonicalized payload together with its stored bytes and checksum.
#[derive(Clone, Debug)]
pub struct CanonicalFxPayload {
    pub payload: FxPayload,
    pub bytes: Vec<u8>,
    pub checksum: String,
}

/// Canonicalize a raw rate bundle. Rates arrive as JSON strings or numbers.
pub fn canonical_fx_payload(
    base_currency: &str,
    effective_date: &str,
    rates: &serde_json::Map<String, Value>,
) -> Result<CanonicalFxPayload, FxError> {
    let base = base_currency.trim().to_ascii_uppercase();
    if base.is_empty() {
        return Err(FxError::BaseCurrencyRequired);
    }
    if base.len() != 3 || !base.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(FxError::BaseCurrencyInvalid(base_currency.to_string()));
    }

    let effective = effective_date.trim();
    if effective.is_empty() {
        return Err(FxError::EffectiveDateRequired);
    }

    if rates.is_empty() {
        return Err(FxError::RatesRequired);
    }

    let mut normalized: BTreeMap<String, String> = BTreeMap::new();
    for (currency, value) in rates {
        let cur = Currency::parse(currency)
            .map_err(|_| FxError::RateCurrencyInvalid(currency.clone()))?;
        let raw = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => return Err(FxError::RateDecimalInvalid(other.to_string())),
        };
        let dec: Decimal = raw
            .trim()
            .parse()
            .map_err(|_| FxError::RateDecimalInvalid(raw.clone()))?;
        if dec <= Decimal::ZERO {
            return Err(FxError::RateNonPositive(format_plain(&dec)));
        }
        normalized.insert(cur.as_str().to_string(), format_plain(&dec));
    }

    let payload = FxPayload {
        base_currency: base,
        effective_date: effective.to_string(),
        rates: normalized,
    };
    let bytes = to_canonical_bytes(&payload)
        .map_err(|e| FxError::PayloadParse(e.to_string()))?;
    let checksum = sha256_hex(&bytes);
    Ok(CanonicalFxPayload {
        payload,
        bytes,
        checksum,
    })
}

/// Stable storage key for an FX artifact.
pub fn fx_artifact_key(dataset_version_id: &DatasetVersionId, checksum: &str) -> String {
    format!("core/fx/{dataset_version_id}/{checksum}.json")
}

fn payload_schema() -> &'static JSONSchema {
    static SCHEMA: OnceLock<JSONSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let doc = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "required": ["base_currency", "effective_date", "rates"],
            "additionalProperties": false,
            "properties": {
                "base_currency": { "type": "string", "pattern": "^[A-Z]{3}$" },
                "effective_date": { "type": "string", "minLength": 1 },
                "rates": {
                    "type": "object",
                    "minProperties": 1,
                    "patternProperties": { "^[A-Z]{3}$": { "type": "string" } },
                    "additionalProperties": false
                }
            }
        });
        JSONSchema::options()
            .with_draft(Draft::Draft202012)
            .compile(&doc)
            .expect("embedded fx payload schema compiles")
    })
}

/// Parse stored payload bytes, validating shape against the embedded schema.
pub fn parse_fx_payload(bytes: &[u8]) -> Result<FxPayload, FxError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| FxError::PayloadParse(e.to_string()))?;
    if let Err(errors) = payload_schema().validate(&value) {
        let detail = errors
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(FxError::PayloadSchema(detail));
    }
    serde_json::from_value(value).map_err(|e| FxError::PayloadParse(e.to_string()))
}
