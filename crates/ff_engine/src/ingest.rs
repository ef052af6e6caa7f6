//! Ingestion (consumed interface).
//!
//! Mints a time-ordered DatasetVersion and stores opaque raw payloads.
//! Validation is batch-atomic: any missing or malformed required field
//! rejects the whole batch before a single row is written. Timestamps come
//! from the caller; nothing here reads a clock.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use uuid::{Builder, Uuid};

use ff_core::ids::{deterministic_id, NAMESPACE_LINK};
use ff_core::DatasetVersionId;
use ff_io::canonical_json::to_canonical_json_bytes;
use ff_io::hasher::sha256_hex;

use crate::state::{DatasetVersionRow, EngineState, RawRecordRow};
use crate::EngineError;

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

/// Ingest a batch of raw records under a fresh DatasetVersion.
pub fn ingest_records(
    state: &mut EngineState,
    records: &[Value],
    ingested_at: DateTime<FixedOffset>,
) -> Result<(DatasetVersionId, usize), EngineError> {
    if records.is_empty() {
        return Err(EngineError::RecordFieldMissing("records".to_string()));
    }

    // Validate everything before writing anything.
    let mut payloads: Vec<(&serde_json::Map<String, Value>, String, String)> = Vec::new();
    for record in records {
        let obj = record.as_object().ok_or(EngineError::RecordInvalidType)?;
        for field in REQUIRED_FIELDS {
            if !obj.contains_key(field) {
                return Err(EngineError::RecordFieldMissing(field.to_string()));
            }
        }
        let source_system = required_string(obj, "source_system")?;
        let source_record_id = required_string(obj, "source_record_id")?;
        payloads.push((obj, source_system, source_record_id));
    }

    let dataset_version_id = mint_dataset_version_id(ingested_at, records);
    state.insert_dataset(DatasetVersionRow {
        id: dataset_version_id.clone(),
        created_at: ingested_at,
    });

    let mut written = 0usize;
    for (index, (payload, source_system, source_record_id)) in payloads.into_iter().enumerate() {
        let raw_record_id = deterministic_id(
            &NAMESPACE_LINK,
            &["raw_record", dataset_version_id.as_str(), &index.to_string()],
        )?
        .parse()
        .map_err(EngineError::Core)?;
        state.insert_raw_record(RawRecordRow {
            raw_record_id,
            dataset_version_id: dataset_version_id.clone(),
            source_system,
            source_record_id,
            payload: payload.clone(),
            ingested_at,
        });
        written += 1;
    }

    tracing::info!(
        dataset_version_id = %dataset_version_id,
        records = written,
        "ingested raw records"
    );
    Ok((dataset_version_id, written))
}

fn required_string(
    obj: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<String, EngineError> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(EngineError::RecordFieldMissing(field.to_string())),
    }
}

/// Time-ordered (v7) dataset id. The timestamp half comes from the caller's
/// `ingested_at`; the entropy half is a content digest over the batch so the
/// same batch replays to the same id. The digest sorts per-record canonical
/// bytes first, so ingestion order does not leak into the identity.
fn mint_dataset_version_id(
    ingested_at: DateTime<FixedOffset>,
    records: &[Value],
) -> DatasetVersionId {
    let millis = ingested_at.timestamp_millis().max(0) as u64;

    let mut parts: Vec<Vec<u8>> = records.iter().map(to_canonical_json_bytes).collect();
    parts.sort();
    let mut joined = Vec::new();
    for part in parts {
        joined.extend_from_slice(&part);
        joined.push(b'\n');
    }
    let digest = sha256_hex(&joined);
    let mut tail = [0u8; 10];
    // First 10 bytes of the hex digest, decoded pairwise.
    for (i, chunk) in digest.as_bytes().chunks(2).take(10).enumerate() {
        let hi = (chunk[0] as char).to_digit(16).unwrap_or(0) as u8;
        let lo = (chunk[1] as char).to_digit(16).unwrap_or(0) as u8;
        tail[i] = (hi << 4) | lo;
    }

    let uuid: Uuid = Builder::from_unix_timestamp_millis(millis, &tail).into_uuid();
    DatasetVersionId::from(uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ff_core::time::parse_offset_datetime;
    use serde_json::json;

    fn at() -> DateTime<FixedOffset> {
        parse_offset_datetime("2026-01-10T00:00:00Z").unwrap()
    }

    fn record(tag: &str) -> Value {
        json!({
            "source_system": "erp-a",
            "source_record_id": tag,
            "record_type": "invoice",
            "posted_at": "2026-01-01T00:00:00Z",
            "counterparty_id": "C1",
            "amount_original": "10.00",
            "currency_original": "USD",
            "direction": "debit"
        })
    }

    #[test]
    fn batch_ingest_creates_dataset_and_rows() {
        let mut state = EngineState::new();
        let (dv, written) =
            ingest_records(&mut state, &[record("a"), record("b")], at()).unwrap();
        assert_eq!(written, 2);
        assert!(state.dataset_exists(&dv));
        assert_eq!(state.raw_records_for_dataset(&dv).len(), 2);
    }

    #[test]
    fn missing_field_rejects_whole_batch() {
        let mut state = EngineState::new();
        let mut bad = record("b");
        bad.as_object_mut().unwrap().remove("direction");
        let err = ingest_records(&mut state, &[record("a"), bad], at()).unwrap_err();
        assert!(matches!(err, EngineError::RecordFieldMissing(ref f) if f == "direction"));
        assert_eq!(state.counts().raw_records, 0);
        assert_eq!(state.counts().datasets, 0);
    }

    #[test]
    fn dataset_id_is_content_derived_and_order_independent() {
        let mut a = EngineState::new();
        let mut b = EngineState::new();
        let (dv_a, _) = ingest_records(&mut a, &[record("x"), record("y")], at()).unwrap();
        let (dv_b, _) = ingest_records(&mut b, &[record("y"), record("x")], at()).unwrap();
        assert_eq!(dv_a, dv_b);

        let mut c = EngineState::new();
        let (dv_c, _) = ingest_records(&mut c, &[record("x"), record("z")], at()).unwrap();
        assert_ne!(dv_a, dv_c);
    }

    #[test]
    fn non_object_records_rejected() {
        let mut state = EngineState::new();
        let err = ingest_records(&mut state, &[json!("nope")], at()).unwrap_err();
        assert!(matches!(err, EngineError::RecordInvalidType));
    }
}
