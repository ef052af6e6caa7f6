//! Exact one-to-one rules: invoice↔payment and invoice↔credit-note.
//!
//! Eligibility: same counterparty, opposite direction, optional posted-date
//! window, signed converted amounts summing to exactly zero.
//!
//! Deterministic selection across eligible counterparts:
//! 1) prefer a nonempty reference intersection
//! 2) prefer the smallest posted-day difference
//! 3) lowest record_id

use std::collections::BTreeSet;

use ff_core::{RecordId, RecordType};

use crate::framework::{
    CanonicalInput, Confidence, ExcludedCandidate, MatchError, MatchOutcome, MatchSelection,
    MatchingRule, RuleContext,
};
use crate::rules::{
    balances_to_zero, eligible_by_date, has_ref_intersection, opposite_direction,
    posted_days_diff, same_counterparty,
};

/// Exact pair rule parameterized over the counterpart record type.
pub struct ExactPairRule {
    rule_id: &'static str,
    counterpart_type: RecordType,
}

impl ExactPairRule {
    pub fn invoice_payment() -> Self {
        Self {
            rule_id: "ff.match.invoice_payment.exact",
            counterpart_type: RecordType::Payment,
        }
    }

    pub fn invoice_credit_note() -> Self {
        Self {
            rule_id: "ff.match.invoice_credit_note.exact",
            counterpart_type: RecordType::CreditNote,
        }
    }
}

impl MatchingRule for ExactPairRule {
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
            let mut candidates: Vec<&CanonicalInput> = counterparts
                .iter()
                .copied()
                .filter(|c| {
                    same_counterparty(inv, c)
                        && opposite_direction(inv, c)
                        && eligible_by_date(context, inv, c)
                        && balances_to_zero(inv, c)
                })
                .collect();
            if candidates.is_empty() {
                continue;
            }
            candidates.sort_by_key(|c| {
                (
                    if has_ref_intersection(inv, c) { 0u8 } else { 1u8 },
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
                confidence: Confidence::Exact,
                matched_record_ids: vec![inv.record_id.clone(), chosen.record_id.clone()],
                unmatched_amount: None,
                tolerance_applied: None,
                selection_rationale:
                    "Exact converted amounts balance to zero; deterministic selection applied."
                        .to_string(),
                selection: MatchSelection {
                    method: "first_match_wins",
                    criteria: vec!["reference_intersection", "days_diff", "record_id"],
                    candidates_considered: candidates.len(),
                    excluded,
                },
            });
        }
        Ok(outcomes)
    }
}
