//! Canonical normalization: raw payload → canonical record.
//!
//! Deterministic mapping only. The function performs alias mapping, currency
//! and amount validation, reference-id parsing, and offset-aware timestamp
//! parsing; it never consults external data, never infers direction or
//! category from amounts, and never aggregates across records. The
//! `EnrichmentImport` / `AccountingAssumption` kinds exist as structural
//! guards for those forbidden operation classes.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use ff_core::currency::Currency;
use ff_core::errors::CoreError;
use ff_core::time::parse_offset_datetime;
use ff_core::{DatasetVersionId, Direction, RecordId, RecordType};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("CANONICAL_FIELD_MISSING: required field '{0}' is missing")]
    FieldMissing(&'static str),

    #[error("CANONICAL_TYPE_INVALID: cannot map record_type '{0}' to canonical enum")]
    TypeInvalid(String),

    #[error("CANONICAL_CURRENCY_INVALID: {0}")]
    CurrencyInvalid(String),

    #[error("CANONICAL_DIRECTION_INVALID: cannot map direction '{0}' to debit/credit")]
    DirectionInvalid(String),

    #[error("CANONICAL_DATE_INVALID: cannot parse posted_at: {0}")]
    DateInvalid(String),

    #[error("CANONICAL_AMOUNT_INVALID: cannot parse amount: {0}")]
    AmountInvalid(String),

    #[error("CANONICAL_AMOUNT_NOT_POSITIVE: {0}")]
    AmountNotPositive(String),

    /// Structural guard: normalization must not import enrichment data.
    #[error("ENRICHMENT_IMPORT: {0}")]
    EnrichmentImport(&'static str),

    /// Structural guard: normalization must not apply accounting policy.
    #[error("ACCOUNTING_ASSUMPTION: {0}")]
    AccountingAssumption(&'static str),

    #[error("ID_DERIVATION: {0}")]
    Id(#[from] CoreError),
}

/// Deterministic projection of a raw record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub record_id: RecordId,
    pub dataset_version_id: DatasetVersionId,
    pub source_system: String,
    pub source_record_id: String,
    pub record_type: RecordType,
    pub posted_at: DateTime<FixedOffset>,
    pub counterparty_id: String,
    pub amount_original: Decimal,
    pub currency_original: Currency,
    pub direction: Direction,
    /// Ordered set: insertion order preserved, duplicates dropped.
    pub reference_ids: Vec<String>,
    pub ingested_at: DateTime<FixedOffset>,
}

const REQUIRED_FIELDS: [&str; 8] = [
    "source_system",
    "source_record_id",
    "record_type",
    "posted_at",
    "counterparty_id",
    "amount_original",
    "currency_original",
    "direction",
];

/// Normalize one raw payload into a canonical record.
pub fn normalize_record(
    payload: &serde_json::Map<String, Value>,
    dataset_version_id: &DatasetVersionId,
    ingested_at: DateTime<FixedOffset>,
) -> Result<CanonicalRecord, NormalizeError> {
    for field in REQUIRED_FIELDS {
        if !payload.contains_key(field) {
            return Err(NormalizeError::FieldMissing(field));
        }
    }

    let source_system = string_field(payload, "source_system")?;
    let source_record_id = string_field(payload, "source_record_id")?;
    let counterparty_id = string_field(payload, "counterparty_id")?;

    let raw_type = string_field(payload, "record_type")?;
    let record_type = RecordType::from_alias(&raw_type)
        .ok_or_else(|| NormalizeError::TypeInvalid(raw_type.clone()))?;

    let raw_direction = string_field(payload, "direction")?;
    let direction = Direction::from_alias(&raw_direction)
        .ok_or_else(|| NormalizeError::DirectionInvalid(raw_direction.clone()))?;

    let raw_currency = string_field(payload, "currency_original")?;
    let currency_original = Currency::parse(&raw_currency)
        .map_err(|_| NormalizeError::CurrencyInvalid(raw_currency.clone()))?;

    let amount_original = parse_amount(&payload["amount_original"])?;
    if amount_original <= Decimal::ZERO {
        return Err(NormalizeError::AmountNotPositive(amount_original.to_string()));
    }

    let raw_posted = string_field(payload, "posted_at")?;
    let posted_at = parse_offset_datetime(&raw_posted)
        .map_err(|_| NormalizeError::DateInvalid(raw_posted.clone()))?;

    let reference_ids = parse_reference_ids(payload.get("reference_ids"));

    let record_id = RecordId::derive(dataset_version_id, &source_system, &source_record_id)?;

    Ok(CanonicalRecord {
        record_id,
        dataset_version_id: dataset_version_id.clone(),
        source_system,
        source_record_id,
        record_type,
        posted_at,
        counterparty_id,
        amount_original,
        currency_original,
        direction,
        reference_ids,
        ingested_at,
    })
}

fn string_field(
    payload: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<String, NormalizeError> {
    match payload.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(_) | None => Err(NormalizeError::FieldMissing(field)),
    }
}

fn parse_amount(value: &Value) -> Result<Decimal, NormalizeError> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        // Numbers go through their textual form; floats never touch Decimal.
        Value::Number(n) => n.to_string(),
        other => return Err(NormalizeError::AmountInvalid(other.to_string())),
    };
    raw.parse::<Decimal>()
        .map_err(|_| NormalizeError::AmountInvalid(raw))
}

/// Reference ids arrive as a list or a comma-separated string. Absent, null,
/// and empty all become the empty sequence; entries are trimmed, empties
/// dropped, duplicates removed with first-occurrence order kept.
fn parse_reference_ids(value: Option<&Value>) -> Vec<String> {
    let raw_items: Vec<String> = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(|part| part.trim().to_string()).collect(),
        Some(_) => Vec::new(),
    };

    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for item in raw_items {
        if item.is_empty() {
            continue;
        }
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dv() -> DatasetVersionId {
        "00000000-0000-7000-8000-000000000001".parse().unwrap()
    }

    fn ingested() -> DateTime<FixedOffset> {
        parse_offset_datetime("2026-01-10T00:00:00Z").unwrap()
    }

    fn payload() -> serde_json::Map<String, Value> {
        json!({
            "source_system": "erp-a",
            "source_record_id": "inv-001",
            "record_type": "INV",
            "posted_at": "2026-01-01T00:00:00Z",
            "counterparty_id": "C1",
            "amount_original": "100.00",
            "currency_original": "usd",
            "direction": "dr",
            "reference_ids": "doc-1, doc-2, doc-1"
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn happy_path_maps_aliases_and_parses() {
        let rec = normalize_record(&payload(), &dv(), ingested()).unwrap();
        assert_eq!(rec.record_type, RecordType::Invoice);
        assert_eq!(rec.direction, Direction::Debit);
        assert_eq!(rec.currency_original.as_str(), "USD");
        assert_eq!(rec.amount_original.to_string(), "100.00");
        assert_eq!(rec.reference_ids, vec!["doc-1", "doc-2"]);
    }

    #[test]
    fn record_id_is_stable_across_calls() {
        let a = normalize_record(&payload(), &dv(), ingested()).unwrap();
        let b = normalize_record(&payload(), &dv(), ingested()).unwrap();
        assert_eq!(a.record_id, b.record_id);
    }

    #[test]
    fn missing_field_is_its_own_kind() {
        let mut p = payload();
        p.remove("counterparty_id");
        let err = normalize_record(&p, &dv(), ingested()).unwrap_err();
        assert!(matches!(err, NormalizeError::FieldMissing("counterparty_id")));
    }

    #[test]
    fn unknown_type_direction_currency_rejected() {
        let mut p = payload();
        p.insert("record_type".into(), json!("receipt"));
        assert!(matches!(
            normalize_record(&p, &dv(), ingested()).unwrap_err(),
            NormalizeError::TypeInvalid(_)
        ));

        let mut p = payload();
        p.insert("direction".into(), json!("sideways"));
        assert!(matches!(
            normalize_record(&p, &dv(), ingested()).unwrap_err(),
            NormalizeError::DirectionInvalid(_)
        ));

        let mut p = payload();
        p.insert("currency_original".into(), json!("XXX"));
        assert!(matches!(
            normalize_record(&p, &dv(), ingested()).unwrap_err(),
            NormalizeError::CurrencyInvalid(_)
        ));
    }

    #[test]
    fn naive_posted_at_rejected() {
        let mut p = payload();
        p.insert("posted_at".into(), json!("2026-01-01T00:00:00"));
        assert!(matches!(
            normalize_record(&p, &dv(), ingested()).unwrap_err(),
            NormalizeError::DateInvalid(_)
        ));
    }

    #[test]
    fn non_positive_amounts_rejected() {
        for bad in ["0", "-5.00"] {
            let mut p = payload();
            p.insert("amount_original".into(), json!(bad));
            assert!(matches!(
                normalize_record(&p, &dv(), ingested()).unwrap_err(),
                NormalizeError::AmountNotPositive(_)
            ));
        }
    }

    #[test]
    fn reference_ids_list_null_and_absent() {
        let mut p = payload();
        p.insert("reference_ids".into(), json!(["a", " b ", "", "a"]));
        let rec = normalize_record(&p, &dv(), ingested()).unwrap();
        assert_eq!(rec.reference_ids, vec!["a", "b"]);

        let mut p = payload();
        p.insert("reference_ids".into(), Value::Null);
        assert!(normalize_record(&p, &dv(), ingested())
            .unwrap()
            .reference_ids
            .is_empty());

        let mut p = payload();
        p.remove("reference_ids");
        assert!(normalize_record(&p, &dv(), ingested())
            .unwrap()
            .reference_ids
            .is_empty());
    }

    #[test]
    fn direction_is_never_inferred_from_amount() {
        // A signed amount with no direction field must fail, not guess.
        let mut p = payload();
        p.remove("direction");
        p.insert("amount_original".into(), json!("-100.00"));
        assert!(matches!(
            normalize_record(&p, &dv(), ingested()).unwrap_err(),
            NormalizeError::FieldMissing("direction")
        ));
    }
}
