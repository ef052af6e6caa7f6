//! Evidence schema v1.
//!
//! One bundle per finding, exhaustive by construction: the typed builder
//! cannot produce an incomplete schema, and the payload validator re-checks
//! the serialized map section by section so that a hand-built payload missing
//! any required field is rejected with a per-section error kind before any
//! write happens.
//!
//! On disk the payload is canonical JSON; decimals serialize as strings.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use ff_core::time::{days_diff, to_iso};

use crate::framework::{CanonicalInput, MatchOutcome, RuleContext, FRAMEWORK_VERSION};

#[derive(Debug, Error)]
pub enum EvidenceSchemaError {
    #[error("EVIDENCE_FIELD_MISSING: evidence.{0} is required")]
    Field(String),

    #[error("EVIDENCE_RULE_IDENTITY_FIELD_MISSING: evidence.rule_identity.{0} is required")]
    RuleIdentity(String),

    #[error("EVIDENCE_AMOUNT_COMPARISON_FIELD_MISSING: evidence.amount_comparison.{0} is required")]
    AmountComparison(String),

    #[error("EVIDENCE_DATE_COMPARISON_FIELD_MISSING: evidence.date_comparison.{0} is required")]
    DateComparison(String),

    #[error(
        "EVIDENCE_REFERENCE_COMPARISON_FIELD_MISSING: evidence.reference_comparison.{0} is required"
    )]
    ReferenceComparison(String),

    #[error("EVIDENCE_COUNTERPARTY_FIELD_MISSING: evidence.counterparty.{0} is required")]
    Counterparty(String),

    #[error("EVIDENCE_MATCH_SELECTION_FIELD_MISSING: evidence.match_selection.{0} is required")]
    MatchSelection(String),

    #[error("EVIDENCE_PRIMARY_SOURCES_FIELD_MISSING: evidence.primary_sources.{0} is required")]
    PrimarySources(String),

    #[error("EVIDENCE_PAYLOAD_NOT_OBJECT")]
    NotObject,
}

/// Parameters echoed verbatim into every bundle.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutedParameters {
    pub rounding_mode: String,
    pub rounding_quantum: String,
    pub tolerance_amount: Option<Decimal>,
    pub tolerance_percent: Option<Decimal>,
    pub max_posted_days_diff: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RuleIdentityEvidence {
    pub rule_id: String,
    pub rule_version: String,
    pub framework_version: String,
    pub executed_parameters: ExecutedParameters,
}

#[derive(Clone, Debug, Serialize)]
pub struct ToleranceEvidence {
    pub tolerance_absolute: Option<Decimal>,
    pub tolerance_percent: Option<Decimal>,
    pub threshold_applied: Decimal,
    pub tolerance_source: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct AmountComparisonEvidence {
    pub invoice_amount_original: Decimal,
    pub invoice_currency_original: String,
    pub invoice_amount_converted: Decimal,
    pub counterpart_amounts_original: Vec<Decimal>,
    pub counterpart_currencies_original: Vec<String>,
    pub counterpart_amounts_converted: Vec<Decimal>,
    pub sum_counterpart_amount_original: Decimal,
    pub sum_counterpart_amount_converted: Decimal,
    pub comparison_currency: String,
    pub diff_original: Decimal,
    pub diff_converted: Decimal,
}

#[derive(Clone, Debug, Serialize)]
pub struct DateComparisonEvidence {
    pub invoice_posted_at: String,
    pub counterpart_posted_at: Vec<String>,
    pub date_diffs_days: Vec<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReferenceComparisonEvidence {
    pub invoice_reference_ids: Vec<String>,
    /// Per counterpart, in matched order.
    pub counterpart_reference_ids: Vec<Vec<String>>,
    pub matched_references: Vec<Vec<String>>,
    pub unmatched_references: Vec<Vec<String>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CounterpartyEvidence {
    pub invoice_counterparty_id: String,
    pub counterpart_counterparty_ids: Vec<String>,
    pub counterparty_match: bool,
    pub counterparty_match_logic: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchSelectionRationale {
    pub selection_method: String,
    pub selection_criteria: Vec<String>,
    pub selection_priority: BTreeMap<String, u32>,
    pub excluded_matches: Option<Vec<String>>,
    pub exclusion_reasons: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PrimarySourceLinks {
    pub invoice_record_id: String,
    pub counterpart_record_ids: Vec<String>,
    pub source_system: String,
    pub source_record_ids: Vec<String>,
    pub canonical_record_ids: Vec<String>,
}

/// Complete evidence schema v1. All sections are mandatory; `tolerance` is
/// present exactly when a tolerance was applied.
#[derive(Clone, Debug, Serialize)]
pub struct EvidenceSchemaV1 {
    pub rule_identity: RuleIdentityEvidence,
    pub tolerance: Option<ToleranceEvidence>,
    pub amount_comparison: AmountComparisonEvidence,
    pub date_comparison: DateComparisonEvidence,
    pub reference_comparison: ReferenceComparisonEvidence,
    pub counterparty: CounterpartyEvidence,
    pub match_selection: MatchSelectionRationale,
    pub primary_sources: PrimarySourceLinks,
}

impl EvidenceSchemaV1 {
    /// Build the full schema from an applied outcome. `matched` carries the
    /// resolved canonical inputs in outcome order; the invoice leads.
    pub fn build(
        outcome: &MatchOutcome,
        matched: &[&CanonicalInput],
        context: &RuleContext,
    ) -> Self {
        let invoice = matched[0];
        let counterparts: Vec<&CanonicalInput> = matched[1..].to_vec();

        let invoice_refs: std::collections::BTreeSet<&String> =
            invoice.reference_ids.iter().collect();
        let mut counterpart_refs = Vec::new();
        let mut matched_refs = Vec::new();
        let mut unmatched_refs = Vec::new();
        for c in &counterparts {
            let c_refs: std::collections::BTreeSet<&String> = c.reference_ids.iter().collect();
            let inter: Vec<String> = invoice_refs
                .intersection(&c_refs)
                .map(|s| (*s).clone())
                .collect();
            let outer: Vec<String> = invoice_refs
                .union(&c_refs)
                .filter(|s| !inter.contains(**s))
                .map(|s| (*s).clone())
                .collect();
            counterpart_refs.push(c.reference_ids.clone());
            matched_refs.push(inter);
            unmatched_refs.push(outer);
        }

        let sum_orig: Decimal = counterparts.iter().map(|c| c.amount_original).sum();
        let sum_conv: Decimal = counterparts
            .iter()
            .map(|c| c.converted.amount_converted)
            .sum();

        let params = &context.parameters;
        let tolerance = outcome.tolerance_applied.map(|threshold| ToleranceEvidence {
            tolerance_absolute: params.tolerance_amount,
            tolerance_percent: params.tolerance_percent,
            threshold_applied: threshold,
            tolerance_source: "run_parameters".to_string(),
        });

        let mut priority = BTreeMap::new();
        for (i, criterion) in outcome.selection.criteria.iter().enumerate() {
            priority.insert(criterion.to_string(), (i + 1) as u32);
        }
        let (excluded_matches, exclusion_reasons) = if outcome.selection.excluded.is_empty() {
            (None, None)
        } else {
            (
                Some(
                    outcome
                        .selection
                        .excluded
                        .iter()
                        .map(|e| e.record_id.to_string())
                        .collect(),
                ),
                Some(
                    outcome
                        .selection
                        .excluded
                        .iter()
                        .map(|e| e.reason.to_string())
                        .collect(),
                ),
            )
        };

        EvidenceSchemaV1 {
            rule_identity: RuleIdentityEvidence {
                rule_id: outcome.rule_id.to_string(),
                rule_version: outcome.rule_version.to_string(),
                framework_version: FRAMEWORK_VERSION.to_string(),
                executed_parameters: ExecutedParameters {
                    rounding_mode: params.rounding.mode.as_str().to_string(),
                    rounding_quantum: params.rounding.quantum_str(),
                    tolerance_amount: params.tolerance_amount,
                    tolerance_percent: params.tolerance_percent,
                    max_posted_days_diff: params.max_posted_days_diff,
                },
            },
            tolerance,
            amount_comparison: AmountComparisonEvidence {
                invoice_amount_original: invoice.amount_original,
                invoice_currency_original: invoice.currency_original.as_str().to_string(),
                invoice_amount_converted: invoice.converted.amount_converted,
                counterpart_amounts_original: counterparts
                    .iter()
                    .map(|c| c.amount_original)
                    .collect(),
                counterpart_currencies_original: counterparts
                    .iter()
                    .map(|c| c.currency_original.as_str().to_string())
                    .collect(),
                counterpart_amounts_converted: counterparts
                    .iter()
                    .map(|c| c.converted.amount_converted)
                    .collect(),
                sum_counterpart_amount_original: sum_orig,
                sum_counterpart_amount_converted: sum_conv,
                comparison_currency: invoice.converted.base_currency.clone(),
                diff_original: invoice.amount_original - sum_orig,
                diff_converted: invoice.converted.amount_converted - sum_conv,
            },
            date_comparison: DateComparisonEvidence {
                invoice_posted_at: to_iso(&invoice.posted_at),
                counterpart_posted_at: counterparts
                    .iter()
                    .map(|c| to_iso(&c.posted_at))
                    .collect(),
                date_diffs_days: counterparts
                    .iter()
                    .map(|c| days_diff(&invoice.posted_at, &c.posted_at))
                    .collect(),
            },
            reference_comparison: ReferenceComparisonEvidence {
                invoice_reference_ids: invoice.reference_ids.clone(),
                counterpart_reference_ids: counterpart_refs,
                matched_references: matched_refs,
                unmatched_references: unmatched_refs,
            },
            counterparty: CounterpartyEvidence {
                invoice_counterparty_id: invoice.counterparty_id.clone(),
                counterpart_counterparty_ids: counterparts
                    .iter()
                    .map(|c| c.counterparty_id.clone())
                    .collect(),
                counterparty_match: counterparts
                    .iter()
                    .all(|c| c.counterparty_id == invoice.counterparty_id),
                counterparty_match_logic: "exact".to_string(),
            },
            match_selection: MatchSelectionRationale {
                selection_method: outcome.selection.method.to_string(),
                selection_criteria: outcome
                    .selection
                    .criteria
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                selection_priority: priority,
                excluded_matches,
                exclusion_reasons,
            },
            primary_sources: PrimarySourceLinks {
                invoice_record_id: invoice.record_id.to_string(),
                counterpart_record_ids: counterparts
                    .iter()
                    .map(|c| c.record_id.to_string())
                    .collect(),
                source_system: invoice.source_system.clone(),
                source_record_ids: matched.iter().map(|r| r.source_record_id.clone()).collect(),
                canonical_record_ids: matched.iter().map(|r| r.record_id.to_string()).collect(),
            },
        }
    }

    /// Serialize to the payload map persisted by the registry.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).expect("evidence schema serialization cannot fail")
    }
}

const REQUIRED_TOP_LEVEL: [&str; 7] = [
    "rule_identity",
    "amount_comparison",
    "date_comparison",
    "reference_comparison",
    "counterparty",
    "match_selection",
    "primary_sources",
];

/// Validate a payload map for schema-completeness before any write.
pub fn validate_payload(payload: &Value) -> Result<(), EvidenceSchemaError> {
    let root = payload.as_object().ok_or(EvidenceSchemaError::NotObject)?;

    for field in REQUIRED_TOP_LEVEL {
        if !root.contains_key(field) {
            return Err(EvidenceSchemaError::Field(field.to_string()));
        }
    }

    check_section(root, "rule_identity", &[
        "rule_id",
        "rule_version",
        "framework_version",
        "executed_parameters",
    ], EvidenceSchemaError::RuleIdentity)?;

    check_section(root, "amount_comparison", &[
        "invoice_amount_original",
        "invoice_currency_original",
        "counterpart_amounts_original",
        "counterpart_currencies_original",
        "sum_counterpart_amount_original",
        "comparison_currency",
        "diff_original",
        "invoice_amount_converted",
        "counterpart_amounts_converted",
        "sum_counterpart_amount_converted",
        "diff_converted",
    ], EvidenceSchemaError::AmountComparison)?;

    check_section(root, "date_comparison", &[
        "invoice_posted_at",
        "counterpart_posted_at",
        "date_diffs_days",
    ], EvidenceSchemaError::DateComparison)?;

    check_section(root, "reference_comparison", &[
        "invoice_reference_ids",
        "counterpart_reference_ids",
        "matched_references",
        "unmatched_references",
    ], EvidenceSchemaError::ReferenceComparison)?;

    check_section(root, "counterparty", &[
        "invoice_counterparty_id",
        "counterpart_counterparty_ids",
        "counterparty_match",
        "counterparty_match_logic",
    ], EvidenceSchemaError::Counterparty)?;

    check_section(root, "match_selection", &[
        "selection_method",
        "selection_criteria",
        "selection_priority",
    ], EvidenceSchemaError::MatchSelection)?;

    check_section(root, "primary_sources", &[
        "invoice_record_id",
        "counterpart_record_ids",
        "source_system",
        "source_record_ids",
        "canonical_record_ids",
    ], EvidenceSchemaError::PrimarySources)?;

    Ok(())
}

fn check_section(
    root: &serde_json::Map<String, Value>,
    section: &str,
    required: &[&str],
    make_err: fn(String) -> EvidenceSchemaError,
) -> Result<(), EvidenceSchemaError> {
    let obj = root
        .get(section)
        .and_then(|v| v.as_object())
        .ok_or_else(|| EvidenceSchemaError::Field(section.to_string()))?;
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
    use crate::framework::Confidence;
    use crate::rules::ExactPairRule;
    use crate::framework::MatchingRule;
    use crate::rules::testutil::*;
    use ff_core::{Direction, RecordType};

    fn built_schema() -> EvidenceSchemaV1 {
        let inv = input(
            "i1",
            RecordType::Invoice,
            Direction::Debit,
            "100.00",
            "C1",
            "2026-01-01T00:00:00Z",
            &["doc-1"],
        );
        let pay = input(
            "p1",
            RecordType::Payment,
            Direction::Credit,
            "100.00",
            "C1",
            "2026-01-02T00:00:00Z",
            &["doc-1", "doc-2"],
        );
        let ctx = context(params());
        let rule = ExactPairRule::invoice_payment();
        let outcomes = rule
            .apply(&ctx, &[inv.clone(), pay.clone()], &Default::default())
            .unwrap();
        assert_eq!(outcomes[0].confidence, Confidence::Exact);
        EvidenceSchemaV1::build(&outcomes[0], &[&inv, &pay], &ctx)
    }

    #[test]
    fn built_schema_passes_validation() {
        let schema = built_schema();
        let payload = schema.to_payload();
        validate_payload(&payload).unwrap();

        let amount = &payload["amount_comparison"];
        assert_eq!(amount["diff_original"], "0.00");
        assert_eq!(amount["comparison_currency"], "USD");
        let refs = &payload["reference_comparison"];
        assert_eq!(refs["matched_references"][0][0], "doc-1");
        assert_eq!(refs["unmatched_references"][0][0], "doc-2");
    }

    #[test]
    fn missing_amount_field_raises_section_error() {
        let schema = built_schema();
        let mut payload = schema.to_payload();
        payload["amount_comparison"]
            .as_object_mut()
            .unwrap()
            .remove("diff_original");
        let err = validate_payload(&payload).unwrap_err();
        assert!(matches!(err, EvidenceSchemaError::AmountComparison(ref f) if f == "diff_original"));
        assert!(err
            .to_string()
            .starts_with("EVIDENCE_AMOUNT_COMPARISON_FIELD_MISSING"));
    }

    #[test]
    fn missing_sections_raise_top_level_errors() {
        let schema = built_schema();
        for section in REQUIRED_TOP_LEVEL {
            let mut payload = schema.to_payload();
            payload.as_object_mut().unwrap().remove(section);
            let err = validate_payload(&payload).unwrap_err();
            assert!(matches!(err, EvidenceSchemaError::Field(ref f) if f == section));
        }
    }

    #[test]
    fn rule_identity_subfields_checked() {
        let schema = built_schema();
        let mut payload = schema.to_payload();
        payload["rule_identity"]
            .as_object_mut()
            .unwrap()
            .remove("executed_parameters");
        let err = validate_payload(&payload).unwrap_err();
        assert!(
            matches!(err, EvidenceSchemaError::RuleIdentity(ref f) if f == "executed_parameters")
        );
    }

    #[test]
    fn decimals_serialize_as_strings() {
        let payload = built_schema().to_payload();
        assert!(payload["amount_comparison"]["invoice_amount_original"].is_string());
    }
}
