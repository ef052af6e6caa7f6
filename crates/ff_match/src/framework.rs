//! Matching framework: shared types and the rule contract.
//!
//! Determinism contract:
//! - records reach rules sorted by record_id; rules must not reorder inputs
//! - a rule proposes outcomes; the orchestrator applies them first-match-wins
//! - the signed converted amount (debit positive, credit negative) is the one
//!   accounting convention the engine enforces

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ff_core::amounts::{signed_amount, RoundingSpec};
use ff_core::currency::Currency;
use ff_core::{DatasetVersionId, Direction, FxArtifactId, RecordId, RecordType};

/// Version of the matching framework recorded on every finding.
pub const FRAMEWORK_VERSION: &str = "v1";

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("TOLERANCE_REQUIRED: tolerance_amount or tolerance_percent must be provided")]
    ToleranceRequired,

    /// Malformed rule output is fatal; the run aborts with nothing partial.
    #[error("MALFORMED_RULE_OUTCOME: {0}")]
    MalformedOutcome(String),
}

/// Confidence of a match. Closed set; anything else is unrepresentable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Exact,
    WithinTolerance,
    Partial,
    Ambiguous,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::WithinTolerance => "within_tolerance",
            Self::Partial => "partial",
            Self::Ambiguous => "ambiguous",
        }
    }
}

/// Finding kind; fixed mapping from confidence.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    ExactMatch,
    ToleranceMatch,
    PartialMatch,
}

impl FindingType {
    pub fn from_confidence(confidence: Confidence) -> Self {
        match confidence {
            Confidence::Exact => Self::ExactMatch,
            Confidence::WithinTolerance => Self::ToleranceMatch,
            Confidence::Partial | Confidence::Ambiguous => Self::PartialMatch,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::ToleranceMatch => "tolerance_match",
            Self::PartialMatch => "partial_match",
        }
    }
}

/// Converted amount triple carried next to each canonical record. The base
/// currency comes from the FX artifact, which only length-checks it, so it
/// stays a plain uppercase token here.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertedAmounts {
    pub base_currency: String,
    pub amount_converted: Decimal,
    pub fx_rate_used: Decimal,
}

/// A canonical record plus its conversion, as seen by the rules.
#[derive(Clone, Debug)]
pub struct CanonicalInput {
    pub record_id: RecordId,
    pub record_type: RecordType,
    pub source_system: String,
    pub source_record_id: String,
    pub posted_at: DateTime<FixedOffset>,
    pub counterparty_id: String,
    pub amount_original: Decimal,
    pub currency_original: Currency,
    pub direction: Direction,
    /// Sorted for deterministic reference comparison.
    pub reference_ids: Vec<String>,
    pub converted: ConvertedAmounts,
}

impl CanonicalInput {
    /// Deterministic signed amount: debit = +, credit = −.
    pub fn signed_converted_amount(&self) -> Decimal {
        signed_amount(self.direction, self.converted.amount_converted)
    }
}

/// Parameters a run hands to every rule.
#[derive(Clone, Debug)]
pub struct RuleParameters {
    pub rounding: RoundingSpec,
    pub tolerance_amount: Option<Decimal>,
    pub tolerance_percent: Option<Decimal>,
    pub max_posted_days_diff: Option<i64>,
}

impl RuleParameters {
    pub fn has_tolerance(&self) -> bool {
        self.tolerance_amount.is_some() || self.tolerance_percent.is_some()
    }
}

/// Shared context for one matching pass.
#[derive(Clone, Debug)]
pub struct RuleContext {
    pub dataset_version_id: DatasetVersionId,
    pub fx_artifact_id: FxArtifactId,
    pub started_at: DateTime<FixedOffset>,
    pub parameters: RuleParameters,
}

/// A candidate a rule considered but did not select, with the reason.
#[derive(Clone, Debug)]
pub struct ExcludedCandidate {
    pub record_id: RecordId,
    pub reason: &'static str,
}

/// Selection rationale attached to every outcome.
#[derive(Clone, Debug)]
pub struct MatchSelection {
    pub method: &'static str,
    /// Criteria in priority order (index + 1 is the priority weight).
    pub criteria: Vec<&'static str>,
    pub candidates_considered: usize,
    pub excluded: Vec<ExcludedCandidate>,
}

/// One proposed match.
#[derive(Clone, Debug)]
pub struct MatchOutcome {
    pub rule_id: &'static str,
    pub rule_version: &'static str,
    pub confidence: Confidence,
    /// Invoice first, counterparts after, in selection order.
    pub matched_record_ids: Vec<RecordId>,
    /// Explicit residual for partial matches; `None` for balanced outcomes.
    pub unmatched_amount: Option<Decimal>,
    /// Threshold actually applied, for tolerance rules.
    pub tolerance_applied: Option<Decimal>,
    pub selection_rationale: String,
    pub selection: MatchSelection,
}

impl MatchOutcome {
    /// Structural validity; violations abort the whole run.
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.matched_record_ids.is_empty() {
            return Err(MatchError::MalformedOutcome(format!(
                "{}: empty matched set",
                self.rule_id
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for rid in &self.matched_record_ids {
            if !seen.insert(rid) {
                return Err(MatchError::MalformedOutcome(format!(
                    "{}: duplicate record id {rid} within outcome",
                    self.rule_id
                )));
            }
        }
        Ok(())
    }

    /// Sort key used by the orchestrator before applying proposals.
    pub fn sort_key(&self) -> (&'static str, &'static str, Vec<RecordId>) {
        (
            self.rule_id,
            self.rule_version,
            self.matched_record_ids.clone(),
        )
    }
}

/// Contract every concrete rule implements.
pub trait MatchingRule {
    fn rule_id(&self) -> &'static str;
    fn rule_version(&self) -> &'static str;

    /// Propose outcomes over `records` (sorted by record_id). `used` holds the
    /// record ids already claimed by earlier rules; proposals touching them
    /// are allowed but will be skipped by the orchestrator.
    fn apply(
        &self,
        context: &RuleContext,
        records: &[CanonicalInput],
        used: &std::collections::BTreeSet<RecordId>,
    ) -> Result<Vec<MatchOutcome>, MatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finding_type_mapping_is_fixed() {
        assert_eq!(
            FindingType::from_confidence(Confidence::Exact),
            FindingType::ExactMatch
        );
        assert_eq!(
            FindingType::from_confidence(Confidence::WithinTolerance),
            FindingType::ToleranceMatch
        );
        assert_eq!(
            FindingType::from_confidence(Confidence::Partial),
            FindingType::PartialMatch
        );
        assert_eq!(
            FindingType::from_confidence(Confidence::Ambiguous),
            FindingType::PartialMatch
        );
    }

    fn outcome(ids: &[&str]) -> MatchOutcome {
        MatchOutcome {
            rule_id: "test.rule",
            rule_version: "v1",
            confidence: Confidence::Exact,
            matched_record_ids: ids
                .iter()
                .copied()
                .map(|s| {
                    ff_core::ids::deterministic_id(&ff_core::ids::NAMESPACE_CANONICAL_RECORD, &[s])
                        .unwrap()
                        .parse()
                        .unwrap()
                })
                .collect(),
            unmatched_amount: None,
            tolerance_applied: None,
            selection_rationale: String::new(),
            selection: MatchSelection {
                method: "first_match_wins",
                criteria: vec![],
                candidates_considered: 0,
                excluded: vec![],
            },
        }
    }

    #[test]
    fn malformed_outcomes_are_rejected() {
        assert!(outcome(&[]).validate().is_err());
        assert!(outcome(&["a", "a"]).validate().is_err());
        assert!(outcome(&["a", "b"]).validate().is_ok());
    }
}
