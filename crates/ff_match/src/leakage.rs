//! Leakage typology classification and exposure derivation.
//!
//! The classifier is explicit and version-tagged; rules are evaluated in a
//! fixed order over the finding and its bound evidence. Exposure is derived
//! from the converted comparison basis; no range-estimation heuristics run
//! without explicit inputs. Advisory signals only; no fraud or intent claim.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use ff_core::amounts::signed_amount;
use ff_core::Direction;

use crate::evidence_schema::EvidenceSchemaV1;
use crate::framework::{Confidence, FindingType};

pub const CLASSIFIER_RULE_ID: &str = "ff.leakage.classify";
pub const CLASSIFIER_RULE_VERSION: &str = "v1";

/// Closed typology set.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Typology {
    UnmatchedPayableExposure,
    UnmatchedReceivableExposure,
    DuplicateSettlementRisk,
    TimingInconsistency,
    ToleranceVariance,
    SettledExact,
}

impl Typology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnmatchedPayableExposure => "unmatched_payable_exposure",
            Self::UnmatchedReceivableExposure => "unmatched_receivable_exposure",
            Self::DuplicateSettlementRisk => "duplicate_settlement_risk",
            Self::TimingInconsistency => "timing_inconsistency",
            Self::ToleranceVariance => "tolerance_variance",
            Self::SettledExact => "settled_exact",
        }
    }
}

/// Classifier inputs, assembled from a finding and its evidence bundle.
pub struct LeakageInputs<'a> {
    pub finding_type: FindingType,
    pub confidence: Confidence,
    pub invoice_direction: Direction,
    pub unmatched_amount: Option<Decimal>,
    pub evidence: &'a EvidenceSchemaV1,
    /// Optional day threshold beyond which a settled pair is flagged.
    pub timing_inconsistency_days_threshold: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Classification {
    pub typology: Typology,
    pub assignment_rule_id: &'static str,
    pub assignment_rule_version: &'static str,
    pub assignment_criteria: String,
    pub assignment_confidence: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct Exposure {
    pub exposure_signed: Decimal,
    pub exposure_abs: Decimal,
    pub derivation_method: &'static str,
    pub derivation_inputs: Vec<&'static str>,
    pub derivation_confidence: &'static str,
    /// `original_only` or `fx_to_base`; this engine always converts.
    pub currency_mode: &'static str,
}

/// Assign a typology. Rules are evaluated top to bottom; the first match wins.
pub fn classify_finding(inputs: &LeakageInputs<'_>) -> Classification {
    let diff_converted = inputs.evidence.amount_comparison.diff_converted;

    let (typology, criteria) = match inputs.finding_type {
        FindingType::PartialMatch => {
            if diff_converted < Decimal::ZERO {
                (
                    Typology::DuplicateSettlementRisk,
                    "partial match whose counterpart sum exceeds the invoice amount".to_string(),
                )
            } else {
                match inputs.invoice_direction {
                    Direction::Debit => (
                        Typology::UnmatchedReceivableExposure,
                        "partial match with residual on a debit invoice".to_string(),
                    ),
                    Direction::Credit => (
                        Typology::UnmatchedPayableExposure,
                        "partial match with residual on a credit invoice".to_string(),
                    ),
                }
            }
        }
        FindingType::ExactMatch | FindingType::ToleranceMatch => {
            let max_days = inputs
                .evidence
                .date_comparison
                .date_diffs_days
                .iter()
                .copied()
                .max()
                .unwrap_or(0);
            if let Some(threshold) = inputs.timing_inconsistency_days_threshold {
                if max_days > threshold {
                    return Classification {
                        typology: Typology::TimingInconsistency,
                        assignment_rule_id: CLASSIFIER_RULE_ID,
                        assignment_rule_version: CLASSIFIER_RULE_VERSION,
                        assignment_criteria: format!(
                            "settled match with posted-day gap {max_days} above threshold {threshold}"
                        ),
                        assignment_confidence: inputs.confidence.as_str(),
                    };
                }
            }
            if inputs.finding_type == FindingType::ToleranceMatch {
                (
                    Typology::ToleranceVariance,
                    "match settled within explicit tolerance with nonzero variance".to_string(),
                )
            } else {
                (
                    Typology::SettledExact,
                    "converted amounts balance exactly".to_string(),
                )
            }
        }
    };

    Classification {
        typology,
        assignment_rule_id: CLASSIFIER_RULE_ID,
        assignment_rule_version: CLASSIFIER_RULE_VERSION,
        assignment_criteria: criteria,
        assignment_confidence: inputs.confidence.as_str(),
    }
}

/// Derive (signed, absolute) exposure from the converted comparison basis.
pub fn derive_exposure(inputs: &LeakageInputs<'_>) -> Exposure {
    match inputs.finding_type {
        FindingType::PartialMatch => {
            let residual = inputs.unmatched_amount.unwrap_or(Decimal::ZERO);
            let signed = signed_amount(inputs.invoice_direction, residual);
            Exposure {
                exposure_signed: signed,
                exposure_abs: signed.abs(),
                derivation_method: "partial_residual_in_base",
                derivation_inputs: vec!["unmatched_amount", "invoice_direction"],
                derivation_confidence: inputs.confidence.as_str(),
                currency_mode: "fx_to_base",
            }
        }
        FindingType::ToleranceMatch => {
            let diff = inputs.evidence.amount_comparison.diff_converted;
            let signed = signed_amount(inputs.invoice_direction, diff);
            Exposure {
                exposure_signed: signed,
                exposure_abs: signed.abs(),
                derivation_method: "tolerance_imbalance_in_base",
                derivation_inputs: vec!["diff_converted", "invoice_direction"],
                derivation_confidence: inputs.confidence.as_str(),
                currency_mode: "fx_to_base",
            }
        }
        FindingType::ExactMatch => Exposure {
            exposure_signed: Decimal::ZERO,
            exposure_abs: Decimal::ZERO,
            derivation_method: "exact_settlement_zero",
            derivation_inputs: vec!["diff_converted"],
            derivation_confidence: inputs.confidence.as_str(),
            currency_mode: "fx_to_base",
        },
    }
}

// ------------------------------------------------ leakage evidence schema ----

#[derive(Debug, Error)]
pub enum LeakageEvidenceError {
    #[error("LEAKAGE_EVIDENCE_FIELD_MISSING: evidence.{0} is required")]
    Field(String),

    #[error("LEAKAGE_EVIDENCE_TYPOLOGY_FIELD_MISSING: evidence.typology_assignment.{0} is required")]
    TypologyAssignment(String),

    #[error("LEAKAGE_EVIDENCE_EXPOSURE_FIELD_MISSING: evidence.exposure_derivation.{0} is required")]
    ExposureDerivation(String),

    #[error("LEAKAGE_EVIDENCE_FINDING_FIELD_MISSING: evidence.finding_references.{0} is required")]
    FindingReferences(String),

    #[error("LEAKAGE_EVIDENCE_RECORDS_FIELD_MISSING: evidence.primary_records.{0} is required")]
    PrimaryRecords(String),

    #[error("LEAKAGE_EVIDENCE_PAYLOAD_NOT_OBJECT")]
    NotObject,
}

#[derive(Clone, Debug, Serialize)]
pub struct TypologyAssignmentEvidence {
    pub leakage_type: String,
    pub assignment_rule_id: String,
    pub assignment_rule_version: String,
    pub assignment_criteria: String,
    pub assignment_confidence: String,
    pub direction_convention: String,
    pub direction_source: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExposureDerivationEvidence {
    pub exposure_amount: Decimal,
    pub exposure_signed: Decimal,
    pub exposure_currency: String,
    pub exposure_basis: String,
    pub exposure_currency_mode: String,
    pub fx_artifact_id: String,
    pub fx_artifact_sha256: String,
    pub rounding_mode: String,
    pub base_currency: String,
    pub derivation_method: String,
    pub derivation_inputs: Vec<String>,
    pub derivation_confidence: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct FindingReferencesEvidence {
    pub related_finding_ids: Vec<String>,
    pub finding_rule_ids: Vec<String>,
    pub finding_rule_versions: Vec<String>,
    pub finding_confidences: Vec<String>,
    pub finding_evidence_ids: Vec<String>,
    pub match_outcome: String,
    pub match_search_scope: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PrimaryRecordsEvidence {
    pub invoice_record_id: String,
    pub invoice_source_system: String,
    pub invoice_source_record_id: String,
    pub invoice_canonical_record_id: String,
    pub counterpart_record_ids: Vec<String>,
    pub counterpart_source_systems: Vec<String>,
    pub counterpart_source_record_ids: Vec<String>,
    pub counterpart_canonical_record_ids: Vec<String>,
    /// Advisory flag only; intercompany netting is out of scope.
    pub is_intercompany: bool,
    pub intercompany_counterparty_ids: Vec<String>,
    pub intercompany_detection_method: String,
}

/// One bundle per leakage item, immutable, dataset-bound.
#[derive(Clone, Debug, Serialize)]
pub struct LeakageEvidenceSchemaV1 {
    pub typology_assignment: TypologyAssignmentEvidence,
    pub exposure_derivation: ExposureDerivationEvidence,
    pub finding_references: FindingReferencesEvidence,
    pub primary_records: PrimaryRecordsEvidence,
}

impl LeakageEvidenceSchemaV1 {
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).expect("leakage evidence serialization cannot fail")
    }
}

/// Validate a leakage evidence payload section by section.
pub fn validate_leakage_payload(payload: &Value) -> Result<(), LeakageEvidenceError> {
    let root = payload.as_object().ok_or(LeakageEvidenceError::NotObject)?;

    for section in [
        "typology_assignment",
        "exposure_derivation",
        "finding_references",
        "primary_records",
    ] {
        if !root.contains_key(section) {
            return Err(LeakageEvidenceError::Field(section.to_string()));
        }
    }

    check(root, "typology_assignment", &[
        "leakage_type",
        "assignment_rule_id",
        "assignment_rule_version",
        "assignment_criteria",
        "assignment_confidence",
        "direction_convention",
        "direction_source",
    ], LeakageEvidenceError::TypologyAssignment)?;

    check(root, "exposure_derivation", &[
        "exposure_amount",
        "exposure_signed",
        "exposure_currency",
        "exposure_basis",
        "exposure_currency_mode",
        "fx_artifact_id",
        "fx_artifact_sha256",
        "rounding_mode",
        "base_currency",
        "derivation_method",
        "derivation_inputs",
        "derivation_confidence",
    ], LeakageEvidenceError::ExposureDerivation)?;

    check(root, "finding_references", &[
        "related_finding_ids",
        "finding_rule_ids",
        "finding_rule_versions",
        "finding_confidences",
        "finding_evidence_ids",
        "match_outcome",
        "match_search_scope",
    ], LeakageEvidenceError::FindingReferences)?;

    check(root, "primary_records", &[
        "invoice_record_id",
        "invoice_source_system",
        "invoice_source_record_id",
        "invoice_canonical_record_id",
        "counterpart_record_ids",
        "counterpart_source_systems",
        "counterpart_source_record_ids",
        "counterpart_canonical_record_ids",
        "is_intercompany",
        "intercompany_counterparty_ids",
        "intercompany_detection_method",
    ], LeakageEvidenceError::PrimaryRecords)?;

    Ok(())
}

fn check(
    root: &serde_json::Map<String, Value>,
    section: &str,
    required: &[&str],
    make_err: fn(String) -> LeakageEvidenceError,
) -> Result<(), LeakageEvidenceError> {
    let obj = root
        .get(section)
        .and_then(|v| v.as_object())
        .ok_or_else(|| LeakageEvidenceError::Field(section.to_string()))?;
    for field in required {
        if !obj.contains_key(*field) {
            return Err(make_err((*field).to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::MatchingRule;
    use crate::rules::testutil::*;
    use crate::rules::{ExactPairRule, PartialOneToManyRule, TolerancePairRule};
    use ff_core::{Direction, RecordType};

    fn evidence_for(
        rule: &dyn MatchingRule,
        records: &[crate::framework::CanonicalInput],
        params: crate::framework::RuleParameters,
    ) -> (crate::framework::MatchOutcome, EvidenceSchemaV1) {
        let ctx = context(params);
        let outcomes = rule.apply(&ctx, records, &Default::default()).unwrap();
        let outcome = outcomes[0].clone();
        let matched: Vec<&crate::framework::CanonicalInput> = outcome
            .matched_record_ids
            .iter()
            .map(|rid| records.iter().find(|r| &r.record_id == rid).unwrap())
            .collect();
        let schema = EvidenceSchemaV1::build(&outcome, &matched, &ctx);
        (outcome, schema)
    }

    #[test]
    fn exact_match_classifies_settled_with_zero_exposure() {
        let inv = input(
            "i1",
            RecordType::Invoice,
            Direction::Debit,
            "100.00",
            "C1",
            "2026-01-01T00:00:00Z",
            &[],
        );
        let pay = input(
            "p1",
            RecordType::Payment,
            Direction::Credit,
            "100.00",
            "C1",
            "2026-01-02T00:00:00Z",
            &[],
        );
        let rule = ExactPairRule::invoice_payment();
        let (outcome, schema) = evidence_for(&rule, &[inv, pay], params());
        let inputs = LeakageInputs {
            finding_type: FindingType::from_confidence(outcome.confidence),
            confidence: outcome.confidence,
            invoice_direction: Direction::Debit,
            unmatched_amount: outcome.unmatched_amount,
            evidence: &schema,
            timing_inconsistency_days_threshold: None,
        };
        let cls = classify_finding(&inputs);
        assert_eq!(cls.typology, Typology::SettledExact);
        let exp = derive_exposure(&inputs);
        assert_eq!(exp.exposure_abs, Decimal::ZERO);
        assert_eq!(exp.currency_mode, "fx_to_base");
    }

    #[test]
    fn timing_threshold_flags_late_settlement() {
        let inv = input(
            "i1",
            RecordType::Invoice,
            Direction::Debit,
            "100.00",
            "C1",
            "2026-01-01T00:00:00Z",
            &[],
        );
        let pay = input(
            "p1",
            RecordType::Payment,
            Direction::Credit,
            "100.00",
            "C1",
            "2026-03-01T00:00:00Z",
            &[],
        );
        let rule = ExactPairRule::invoice_payment();
        let (outcome, schema) = evidence_for(&rule, &[inv, pay], params());
        let inputs = LeakageInputs {
            finding_type: FindingType::ExactMatch,
            confidence: outcome.confidence,
            invoice_direction: Direction::Debit,
            unmatched_amount: None,
            evidence: &schema,
            timing_inconsistency_days_threshold: Some(30),
        };
        assert_eq!(
            classify_finding(&inputs).typology,
            Typology::TimingInconsistency
        );
    }

    #[test]
    fn tolerance_match_exposes_the_variance() {
        let inv = input(
            "i1",
            RecordType::Invoice,
            Direction::Debit,
            "100.00",
            "C1",
            "2026-01-01T00:00:00Z",
            &[],
        );
        let pay = input(
            "p1",
            RecordType::Payment,
            Direction::Credit,
            "99.50",
            "C1",
            "2026-01-02T00:00:00Z",
            &[],
        );
        let mut p = params();
        p.tolerance_amount = Some(dec("1.00"));
        let rule = TolerancePairRule::invoice_payment();
        let (outcome, schema) = evidence_for(&rule, &[inv, pay], p);
        let inputs = LeakageInputs {
            finding_type: FindingType::from_confidence(outcome.confidence),
            confidence: outcome.confidence,
            invoice_direction: Direction::Debit,
            unmatched_amount: None,
            evidence: &schema,
            timing_inconsistency_days_threshold: None,
        };
        assert_eq!(classify_finding(&inputs).typology, Typology::ToleranceVariance);
        let exp = derive_exposure(&inputs);
        assert_eq!(exp.exposure_signed, dec("0.50"));
        assert_eq!(exp.exposure_abs, dec("0.50"));
    }

    #[test]
    fn partial_overshoot_is_duplicate_settlement_risk() {
        let inv = input(
            "i1",
            RecordType::Invoice,
            Direction::Debit,
            "100.00",
            "C1",
            "2026-01-01T00:00:00Z",
            &[],
        );
        let p1 = input(
            "p1",
            RecordType::Payment,
            Direction::Credit,
            "60.00",
            "C1",
            "2026-01-02T00:00:00Z",
            &[],
        );
        let p2 = input(
            "p2",
            RecordType::Payment,
            Direction::Credit,
            "60.00",
            "C1",
            "2026-01-03T00:00:00Z",
            &[],
        );
        let rule = PartialOneToManyRule;
        let (outcome, schema) = evidence_for(&rule, &[inv, p1, p2], params());
        let inputs = LeakageInputs {
            finding_type: FindingType::from_confidence(outcome.confidence),
            confidence: outcome.confidence,
            invoice_direction: Direction::Debit,
            unmatched_amount: outcome.unmatched_amount,
            evidence: &schema,
            timing_inconsistency_days_threshold: None,
        };
        assert_eq!(
            classify_finding(&inputs).typology,
            Typology::DuplicateSettlementRisk
        );
        let exp = derive_exposure(&inputs);
        assert_eq!(exp.exposure_abs, dec("20.00"));
        assert_eq!(exp.exposure_signed, dec("-20.00"));
    }

    #[test]
    fn partial_under_settlement_tracks_invoice_direction() {
        let inv = input(
            "i1",
            RecordType::Invoice,
            Direction::Credit,
            "100.00",
            "C1",
            "2026-01-01T00:00:00Z",
            &[],
        );
        let p1 = input(
            "p1",
            RecordType::Payment,
            Direction::Debit,
            "40.00",
            "C1",
            "2026-01-02T00:00:00Z",
            &[],
        );
        let rule = PartialOneToManyRule;
        let (outcome, schema) = evidence_for(&rule, &[inv, p1], params());
        let inputs = LeakageInputs {
            finding_type: FindingType::from_confidence(outcome.confidence),
            confidence: outcome.confidence,
            invoice_direction: Direction::Credit,
            unmatched_amount: outcome.unmatched_amount,
            evidence: &schema,
            timing_inconsistency_days_threshold: None,
        };
        assert_eq!(
            classify_finding(&inputs).typology,
            Typology::UnmatchedPayableExposure
        );
        let exp = derive_exposure(&inputs);
        assert_eq!(exp.exposure_signed, dec("-60.00"));
        assert_eq!(exp.exposure_abs, dec("60.00"));
    }

    #[test]
    fn leakage_payload_validation_catches_missing_fields() {
        let schema = LeakageEvidenceSchemaV1 {
            typology_assignment: TypologyAssignmentEvidence {
                leakage_type: "settled_exact".into(),
                assignment_rule_id: CLASSIFIER_RULE_ID.into(),
                assignment_rule_version: CLASSIFIER_RULE_VERSION.into(),
                assignment_criteria: "criteria".into(),
                assignment_confidence: "exact".into(),
                direction_convention: "debit_positive_credit_negative".into(),
                direction_source: "canonical_record.direction".into(),
            },
            exposure_derivation: ExposureDerivationEvidence {
                exposure_amount: Decimal::ZERO,
                exposure_signed: Decimal::ZERO,
                exposure_currency: "USD".into(),
                exposure_basis: "converted_comparison".into(),
                exposure_currency_mode: "fx_to_base".into(),
                fx_artifact_id: "fx".into(),
                fx_artifact_sha256: "sha".into(),
                rounding_mode: "half_up".into(),
                base_currency: "USD".into(),
                derivation_method: "exact_settlement_zero".into(),
                derivation_inputs: vec!["diff_converted".into()],
                derivation_confidence: "exact".into(),
            },
            finding_references: FindingReferencesEvidence {
                related_finding_ids: vec!["f".into()],
                finding_rule_ids: vec!["r".into()],
                finding_rule_versions: vec!["v1".into()],
                finding_confidences: vec!["exact".into()],
                finding_evidence_ids: vec!["e".into()],
                match_outcome: "exact_match".into(),
                match_search_scope: "dataset_version".into(),
            },
            primary_records: PrimaryRecordsEvidence {
                invoice_record_id: "i".into(),
                invoice_source_system: "erp".into(),
                invoice_source_record_id: "inv-1".into(),
                invoice_canonical_record_id: "i".into(),
                counterpart_record_ids: vec!["p".into()],
                counterpart_source_systems: vec!["erp".into()],
                counterpart_source_record_ids: vec!["pay-1".into()],
                counterpart_canonical_record_ids: vec!["p".into()],
                is_intercompany: false,
                intercompany_counterparty_ids: vec![],
                intercompany_detection_method: "not_evaluated".into(),
            },
        };
        let payload = schema.to_payload();
        validate_leakage_payload(&payload).unwrap();

        let mut broken = payload.clone();
        broken["exposure_derivation"]
            .as_object_mut()
            .unwrap()
            .remove("fx_artifact_sha256");
        let err = validate_leakage_payload(&broken).unwrap_err();
        assert!(
            matches!(err, LeakageEvidenceError::ExposureDerivation(ref f) if f == "fx_artifact_sha256")
        );
    }
}
