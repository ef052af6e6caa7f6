//! Tolerance one-to-one rules.
//!
//! Eligibility mirrors the exact rules, with the zero-balance predicate
//! relaxed to `|sum of signed converted| ≤ computed tolerance`, where the
//! threshold is `max(tolerance_amount, |invoice_converted| × tolerance_percent)`
//! over the provided parameters (at least one required).
//!
//! Selection: minimum absolute imbalance, then minimum day difference, then
//! lowest record_id.

use std::collections::BTreeSet;

use rust_decimal::Decimal;

use ff_core::{RecordId, RecordType};

use crate::framework::{
    CanonicalInput, Confidence, ExcludedCandidate, MatchError, MatchOutcome, MatchSelection,
    MatchingRule, RuleContext,
};
use crate::rules::{
    computed_tolerance, eligible_by_date, opposite_direction, posted_days_diff, same_counterparty,
};

/// Tolerance pair rule parameterized over the counterpart record type.
pub struct TolerancePairRule {
    rule_id: &'static str,
    counterpart_type: RecordType,
}

impl TolerancePairRule {
    pub fn invoice_payment() -> Self {
        Self {
            rule_id: "ff.match.invoice_payment.tolerance",
            counterpart_type: RecordType::Payment,
        }
    }

    pub fn invoice_credit_note() -> Self {
        Self {
            rule_id: "ff.match.invoice_credit_note.tolerance",
            counterpart_type: RecordType::CreditNote,
        }
    }
}

fn imbalance(inv: &CanonicalInput, other: &CanonicalInput) -> Decimal {
    inv.signed_converted_amount() + other.signed_converted_amount()
}

impl MatchingRule for TolerancePairRule {
    fn rule_id(&self) -> &'static str {
        self.rule_id
    }

    fn rule_version(&self) -> &'static str {
        "v1"
    }

    fn apply(
        &self,
        context: &RuleContext,
        records: &[CanonicalInput],
        used: &BTreeSet<RecordId>,
    ) -> Result<Vec<MatchOutcome>, MatchError> {
        let invoices: Vec<&CanonicalInput> = records
            .iter()
            .filter(|r| r.record_type == RecordType::Invoice && !used.contains(&r.record_id))
            .collect();
        let counterparts: Vec<&CanonicalInput> = records
            .iter()
            .filter(|r| r.record_type == self.counterpart_type && !used.contains(&r.record_id))
            .collect();

        let mut outcomes = Vec::new();
        for inv in invoices {
            let threshold = computed_tolerance(context, inv.converted.amount_converted)?;
            let mut candidates: Vec<&CanonicalInput> = counterparts
                .iter()
                .copied()
                .filter(|c| {
                    same_counterparty(inv, c)
                        && opposite_direction(inv, c)
                        && eligible_by_date(context, inv, c)
                        && imbalance(inv, c).abs() <= threshold
                })
                .collect();
            if candidates.is_empty() {
                continue;
            }
            candidates.sort_by_key(|c| {
                (
                    imbalance(inv, c).abs(),
                    posted_days_diff(inv, c),
                    c.record_id.clone(),
                )
            });
            let chosen = candidates[0];
            let excluded = candidates[1..]
                .iter()
                .map(|c| ExcludedCandidate {
                    record_id: c.record_id.clone(),
                    reason: "lower_preference",
                })
                .collect();

            outcomes.push(MatchOutcome {
                rule_id: self.rule_id,
                rule_version: "v1",
                confidence: Confidence::WithinTolerance,
                matched_record_ids: vec![inv.record_id.clone(), chosen.record_id.clone()],
                unmatched_amount: None,
                tolerance_applied: Some(threshold),
                selection_rationale:
                    "Converted amounts balance within explicit tolerance; deterministic selection applied."
                        .to_string(),
                selection: MatchSelection {
                    method: "first_match_wins",
                    criteria: vec!["min_imbalance", "days_diff", "record_id"],
                    candidates_considered: candidates.len(),
                    excluded,
                },
            });
        }
        Ok(outcomes)
    }
}
