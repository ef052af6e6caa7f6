//! Partial settlement rules.
//!
//! One-to-many: one invoice settled by several payments; counterparts are
//! streamed in `(posted_at, record_id)` order until the invoice amount is
//! covered. Exact balances are skipped; those belong to the exact rules.
//! The residual is explicit and signed: positive when the invoice is
//! under-settled, negative when the accumulated counterparts overshoot.
//!
//! Many-to-one: one payment spread across several invoices, symmetric and
//! payment-driven; emitted only when at least two invoices participate.

use std::collections::BTreeSet;

use rust_decimal::Decimal;

use ff_core::{RecordId, RecordType};

use crate::framework::{
    CanonicalInput, Confidence, ExcludedCandidate, MatchError, MatchOutcome, MatchSelection,
    MatchingRule, RuleContext,
};
use crate::rules::{eligible_by_date, opposite_direction, same_counterparty};

/// Sort key for streamed accumulation.
fn stream_key(r: &CanonicalInput) -> (chrono::DateTime<chrono::FixedOffset>, RecordId) {
    (r.posted_at, r.record_id.clone())
}

pub struct PartialOneToManyRule;

impl MatchingRule for PartialOneToManyRule {
    fn rule_id(&self) -> &'static str {
        "ff.match.invoice_payment.partial"
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
        let mut invoices: Vec<&CanonicalInput> = records
            .iter()
            .filter(|r| r.record_type == RecordType::Invoice && !used.contains(&r.record_id))
            .collect();
        invoices.sort_by_key(|r| r.record_id.clone());

        let mut payments: Vec<&CanonicalInput> = records
            .iter()
            .filter(|r| r.record_type == RecordType::Payment && !used.contains(&r.record_id))
            .collect();
        payments.sort_by_key(|r| stream_key(r));

        let mut outcomes = Vec::new();
        for inv in invoices {
            let candidates: Vec<&CanonicalInput> = payments
                .iter()
                .copied()
                .filter(|p| {
                    same_counterparty(inv, p)
                        && opposite_direction(inv, p)
                        && eligible_by_date(context, inv, p)
                })
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let invoice_abs = inv.signed_converted_amount().abs();
            let mut total_applied = Decimal::ZERO;
            let mut chosen: Vec<&CanonicalInput> = Vec::new();
            let mut excluded: Vec<ExcludedCandidate> = Vec::new();
            for &p in &candidates {
                if total_applied >= invoice_abs {
                    excluded.push(ExcludedCandidate {
                        record_id: p.record_id.clone(),
                        reason: "not_reached_before_cover",
                    });
                    continue;
                }
                let pay_abs = p.signed_converted_amount().abs();
                if pay_abs == Decimal::ZERO {
                    excluded.push(ExcludedCandidate {
                        record_id: p.record_id.clone(),
                        reason: "zero_converted_amount",
                    });
                    continue;
                }
                chosen.push(p);
                total_applied += pay_abs;
            }

            if chosen.is_empty() {
                continue;
            }
            // An exact balance belongs to the exact rules; proposing it here
            // would drift the confidence tag.
            if total_applied == invoice_abs {
                continue;
            }

            let remaining = invoice_abs - total_applied;
            let mut matched_record_ids = vec![inv.record_id.clone()];
            matched_record_ids.extend(chosen.iter().map(|p| p.record_id.clone()));

            outcomes.push(MatchOutcome {
                rule_id: self.rule_id(),
                rule_version: "v1",
                confidence: Confidence::Partial,
                matched_record_ids,
                unmatched_amount: Some(remaining),
                tolerance_applied: None,
                selection_rationale:
                    "Partial settlement group selected deterministically; remaining amount computed explicitly."
                        .to_string(),
                selection: MatchSelection {
                    method: "first_match_wins",
                    criteria: vec!["posted_at", "record_id"],
                    candidates_considered: candidates.len(),
                    excluded,
                },
            });
        }
        Ok(outcomes)
    }
}

pub struct PartialManyToOneRule;

impl MatchingRule for PartialManyToOneRule {
    fn rule_id(&self) -> &'static str {
        "ff.match.invoice_payment.partial_many_to_one"
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
        let mut invoices: Vec<&CanonicalInput> = records
            .iter()
            .filter(|r| r.record_type == RecordType::Invoice && !used.contains(&r.record_id))
            .collect();
        invoices.sort_by_key(|r| stream_key(r));

        let mut payments: Vec<&CanonicalInput> = records
            .iter()
            .filter(|r| r.record_type == RecordType::Payment && !used.contains(&r.record_id))
            .collect();
        payments.sort_by_key(|r| stream_key(r));

        let mut outcomes = Vec::new();
        for pay in payments {
            let candidates: Vec<&CanonicalInput> = invoices
                .iter()
                .copied()
                .filter(|inv| {
                    same_counterparty(inv, pay)
                        && opposite_direction(inv, pay)
                        && eligible_by_date(context, inv, pay)
                })
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let payment_abs = pay.signed_converted_amount().abs();
            let mut total_invoices = Decimal::ZERO;
            let mut chosen: Vec<&CanonicalInput> = Vec::new();
            let mut excluded: Vec<ExcludedCandidate> = Vec::new();
            for &inv in &candidates {
                if total_invoices >= payment_abs {
                    excluded.push(ExcludedCandidate {
                        record_id: inv.record_id.clone(),
                        reason: "not_reached_before_cover",
                    });
                    continue;
                }
                let inv_abs = inv.signed_converted_amount().abs();
                if inv_abs == Decimal::ZERO {
                    excluded.push(ExcludedCandidate {
                        record_id: inv.record_id.clone(),
                        reason: "zero_converted_amount",
                    });
                    continue;
                }
                chosen.push(inv);
                total_invoices += inv_abs;
            }

            // This rule is explicitly many-to-one; single-invoice groups are
            // owned by the one-to-many rule.
            if chosen.len() < 2 {
                continue;
            }
            if total_invoices == payment_abs {
                continue;
            }

            let remaining = total_invoices - payment_abs;
            let mut matched_record_ids: Vec<RecordId> =
                chosen.iter().map(|inv| inv.record_id.clone()).collect();
            matched_record_ids.push(pay.record_id.clone());

            outcomes.push(MatchOutcome {
                rule_id: self.rule_id(),
                rule_version: "v1",
                confidence: Confidence::Partial,
                matched_record_ids,
                unmatched_amount: Some(remaining),
                tolerance_applied: None,
                selection_rationale:
                    "Many-to-one partial group selected deterministically; remaining amount computed explicitly."
                        .to_string(),
                selection: MatchSelection {
                    method: "first_match_wins",
                    criteria: vec!["posted_at", "record_id"],
                    candidates_considered: candidates.len(),
                    excluded,
                },
            });
        }
        Ok(outcomes)
    }
}
