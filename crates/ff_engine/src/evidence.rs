//! Evidence registry.
//!
//! One immutable bundle per finding (and per leakage item), content-validated
//! before write. Conflict semantics on an existing id:
//! - identical (dataset, engine, kind, created_at, payload) → idempotent
//! - differing created_at → `IMMUTABLE_EVIDENCE_CREATED_AT_MISMATCH`
//! - differing payload → `IMMUTABLE_EVIDENCE_MISMATCH`
//! - different (dataset, engine, kind) under the same id → `EVIDENCE_ID_COLLISION`
//!
//! The registry never overwrites existing bytes.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use thiserror::Error;

use ff_core::{CoreError, DatasetVersionId, EvidenceId, RunId};
use ff_io::canonical_json::to_canonical_json_bytes;
use ff_io::hasher::sha256_hex;
use ff_match::evidence_schema::{validate_payload, EvidenceSchemaError};
use ff_match::leakage::{validate_leakage_payload, LeakageEvidenceError};

use crate::state::{EngineState, EvidenceRow};

pub const KIND_FINDING_EVIDENCE: &str = "finding_evidence";
pub const KIND_LEAKAGE_EVIDENCE: &str = "leakage_evidence";

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error(transparent)]
    Schema(#[from] EvidenceSchemaError),

    #[error(transparent)]
    LeakageSchema(#[from] LeakageEvidenceError),

    #[error("EVIDENCE_ID_COLLISION: {0}")]
    IdCollision(String),

    #[error("IMMUTABLE_EVIDENCE_MISMATCH: {0}")]
    ImmutableMismatch(String),

    #[error("IMMUTABLE_EVIDENCE_CREATED_AT_MISMATCH: {0}")]
    CreatedAtMismatch(String),

    #[error("EVIDENCE_KIND_UNKNOWN: {0}")]
    UnknownKind(String),

    #[error("DATASET_VERSION_MISMATCH: {0}")]
    DatasetVersionMismatch(String),

    #[error("MISSING_EVIDENCE: {0}")]
    MissingEvidence(String),

    #[error(transparent)]
    Id(#[from] CoreError),
}

/// Validate a payload for its kind and build the row to be staged.
pub fn build_evidence_row(
    dataset_version_id: &DatasetVersionId,
    engine_id: &str,
    kind: &str,
    stable_key: &str,
    payload: Value,
    created_at: DateTime<FixedOffset>,
) -> Result<EvidenceRow, EvidenceError> {
    match kind {
        KIND_FINDING_EVIDENCE => validate_payload(&payload)?,
        KIND_LEAKAGE_EVIDENCE => validate_leakage_payload(&payload)?,
        other => return Err(EvidenceError::UnknownKind(other.to_string())),
    }

    let evidence_id = EvidenceId::derive(dataset_version_id, engine_id, kind, stable_key)?;
    let payload_sha256 = sha256_hex(&to_canonical_json_bytes(&payload));
    Ok(EvidenceRow {
        evidence_id,
        dataset_version_id: dataset_version_id.clone(),
        engine_id: engine_id.to_string(),
        kind: kind.to_string(),
        payload,
        payload_sha256,
        created_at,
    })
}

/// Outcome of a conflict check against an existing row under the same id.
#[derive(Debug)]
pub enum EvidenceDisposition {
    /// No existing row; insert.
    Insert,
    /// Identical row already present; idempotent no-op.
    AlreadyPresent,
}

/// Enforce the immutability contract against an existing row, if any.
pub fn check_conflict(
    existing: Option<&EvidenceRow>,
    candidate: &EvidenceRow,
) -> Result<EvidenceDisposition, EvidenceError> {
    let existing = match existing {
        None => return Ok(EvidenceDisposition::Insert),
        Some(row) => row,
    };
    if existing.dataset_version_id != candidate.dataset_version_id
        || existing.engine_id != candidate.engine_id
        || existing.kind != candidate.kind
    {
        return Err(EvidenceError::IdCollision(
            candidate.evidence_id.to_string(),
        ));
    }
    if existing.created_at != candidate.created_at {
        return Err(EvidenceError::CreatedAtMismatch(
            candidate.evidence_id.to_string(),
        ));
    }
    if existing.payload_sha256 != candidate.payload_sha256 {
        return Err(EvidenceError::ImmutableMismatch(
            candidate.evidence_id.to_string(),
        ));
    }
    Ok(EvidenceDisposition::AlreadyPresent)
}

/// Fetch evidence rows by id, scoped to one dataset. Cross-dataset access is
/// an error, not a silent filter.
pub fn get_evidence_for_dataset<'a>(
    state: &'a EngineState,
    dataset_version_id: &DatasetVersionId,
    evidence_ids: &[EvidenceId],
) -> Result<Vec<&'a EvidenceRow>, EvidenceError> {
    let mut rows = Vec::with_capacity(evidence_ids.len());
    for id in evidence_ids {
        let row = state
            .evidence(id)
            .ok_or_else(|| EvidenceError::MissingEvidence(id.to_string()))?;
        if &row.dataset_version_id != dataset_version_id {
            return Err(EvidenceError::DatasetVersionMismatch(id.to_string()));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Every evidence id a run's findings reference must resolve to a row bound
/// to the same dataset.
pub fn verify_evidence_traceability(
    state: &EngineState,
    dataset_version_id: &DatasetVersionId,
    run_id: &RunId,
) -> Result<(), EvidenceError> {
    for finding in state.findings_for_run(run_id) {
        get_evidence_for_dataset(state, dataset_version_id, &finding.evidence_ids)?;
        get_evidence_for_dataset(
            state,
            dataset_version_id,
            std::slice::from_ref(&finding.primary_evidence_id),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ff_core::time::parse_offset_datetime;
    use serde_json::json;

    fn dv() -> DatasetVersionId {
        "00000000-0000-7000-8000-000000000001".parse().unwrap()
    }

    fn leakage_payload() -> Value {
        json!({
            "typology_assignment": {
                "leakage_type": "settled_exact",
                "assignment_rule_id": "ff.leakage.classify",
                "assignment_rule_version": "v1",
                "assignment_criteria": "c",
                "assignment_confidence": "exact",
                "direction_convention": "debit_positive_credit_negative",
                "direction_source": "canonical_record.direction"
            },
            "exposure_derivation": {
                "exposure_amount": "0",
                "exposure_signed": "0",
                "exposure_currency": "USD",
                "exposure_basis": "converted_comparison",
                "exposure_currency_mode": "fx_to_base",
                "fx_artifact_id": "fx",
                "fx_artifact_sha256": "sha",
                "rounding_mode": "half_up",
                "base_currency": "USD",
                "derivation_method": "exact_settlement_zero",
                "derivation_inputs": ["diff_converted"],
                "derivation_confidence": "exact"
            },
            "finding_references": {
                "related_finding_ids": [],
                "finding_rule_ids": [],
                "finding_rule_versions": [],
                "finding_confidences": [],
                "finding_evidence_ids": [],
                "match_outcome": "exact_match",
                "match_search_scope": "dataset_version"
            },
            "primary_records": {
                "invoice_record_id": "i",
                "invoice_source_system": "erp",
                "invoice_source_record_id": "inv",
                "invoice_canonical_record_id": "i",
                "counterpart_record_ids": [],
                "counterpart_source_systems": [],
                "counterpart_source_record_ids": [],
                "counterpart_canonical_record_ids": [],
                "is_intercompany": false,
                "intercompany_counterparty_ids": [],
                "intercompany_detection_method": "not_evaluated"
            }
        })
    }

    fn row(created_at: &str, payload: Value) -> EvidenceRow {
        build_evidence_row(
            &dv(),
            "engine_financial_forensics",
            KIND_LEAKAGE_EVIDENCE,
            "stable-key",
            payload,
            parse_offset_datetime(created_at).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn identical_rows_are_idempotent() {
        let a = row("2026-01-01T00:00:00Z", leakage_payload());
        let b = row("2026-01-01T00:00:00Z", leakage_payload());
        assert!(matches!(
            check_conflict(Some(&a), &b).unwrap(),
            EvidenceDisposition::AlreadyPresent
        ));
    }

    #[test]
    fn created_at_mismatch_is_distinct_from_payload_mismatch() {
        let a = row("2026-01-01T00:00:00Z", leakage_payload());
        let later = row("2026-01-02T00:00:00Z", leakage_payload());
        assert!(matches!(
            check_conflict(Some(&a), &later).unwrap_err(),
            EvidenceError::CreatedAtMismatch(_)
        ));

        let mut altered = leakage_payload();
        altered["exposure_derivation"]["exposure_amount"] = json!("1");
        let b = row("2026-01-01T00:00:00Z", altered);
        assert!(matches!(
            check_conflict(Some(&a), &b).unwrap_err(),
            EvidenceError::ImmutableMismatch(_)
        ));
    }

    #[test]
    fn id_collision_detected_across_kinds() {
        let a = row("2026-01-01T00:00:00Z", leakage_payload());
        let mut foreign = a.clone();
        foreign.kind = KIND_FINDING_EVIDENCE.to_string();
        assert!(matches!(
            check_conflict(Some(&foreign), &a).unwrap_err(),
            EvidenceError::IdCollision(_)
        ));
    }

    #[test]
    fn invalid_payload_is_rejected_before_any_id_work() {
        let mut broken = leakage_payload();
        broken.as_object_mut().unwrap().remove("primary_records");
        let err = build_evidence_row(
            &dv(),
            "engine_financial_forensics",
            KIND_LEAKAGE_EVIDENCE,
            "k",
            broken,
            parse_offset_datetime("2026-01-01T00:00:00Z").unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, EvidenceError::LeakageSchema(_)));
    }
}
