//! Deterministic matching orchestrator.
//!
//! Properties:
//! - explicit rule order (rules are applied in slice order)
//! - first-match-wins across rules: once a record id is claimed, later
//!   outcomes that touch it are skipped
//! - deterministic iteration: records sorted by record_id before the first
//!   rule runs; proposals sorted by (rule_id, rule_version, matched ids)
//!   before application

use std::collections::BTreeSet;

use serde::Serialize;

use ff_core::RecordId;

use crate::framework::{CanonicalInput, MatchError, MatchOutcome, MatchingRule, RuleContext};

/// Per-rule telemetry: proposed vs applied. Diagnostics only; never persisted.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OrchestrationLog {
    pub rule_id: &'static str,
    pub rule_version: &'static str,
    pub outcomes_emitted: usize,
    pub outcomes_applied: usize,
}

/// Run the ordered rule list over the records.
pub fn run_matching(
    context: &RuleContext,
    records: &[CanonicalInput],
    rules: &[Box<dyn MatchingRule>],
) -> Result<(Vec<MatchOutcome>, Vec<OrchestrationLog>), MatchError> {
    let mut records_sorted: Vec<CanonicalInput> = records.to_vec();
    records_sorted.sort_by(|a, b| a.record_id.cmp(&b.record_id));

    let mut used_record_ids: BTreeSet<RecordId> = BTreeSet::new();
    let mut all_outcomes: Vec<MatchOutcome> = Vec::new();
    let mut logs: Vec<OrchestrationLog> = Vec::new();

    for rule in rules {
        let mut proposed = rule.apply(context, &records_sorted, &used_record_ids)?;
        for outcome in &proposed {
            outcome.validate()?;
        }
        proposed.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let emitted = proposed.len();
        let mut applied = 0usize;
        for outcome in proposed {
            if outcome
                .matched_record_ids
                .iter()
                .any(|rid| used_record_ids.contains(rid))
            {
                continue;
            }
            for rid in &outcome.matched_record_ids {
                used_record_ids.insert(rid.clone());
            }
            all_outcomes.push(outcome);
            applied += 1;
        }

        logs.push(OrchestrationLog {
            rule_id: rule.rule_id(),
            rule_version: rule.rule_version(),
            outcomes_emitted: emitted,
            outcomes_applied: applied,
        });
    }

    Ok((all_outcomes, logs))
}
