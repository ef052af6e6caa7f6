//! Concrete matching rules.
//!
//! Shared eligibility predicates live here; each rule family has its own file.

pub mod exact;
pub mod partial;
pub mod tolerance;

pub use exact::ExactPairRule;
pub use partial::{PartialManyToOneRule, PartialOneToManyRule};
pub use tolerance::TolerancePairRule;

use rust_decimal::Decimal;

use ff_core::time::days_diff;

use crate::framework::{CanonicalInput, MatchError, RuleContext};

pub(crate) fn same_counterparty(a: &CanonicalInput, b: &CanonicalInput) -> bool {
    a.counterparty_id == b.counterparty_id
}

pub(crate) fn opposite_direction(a: &CanonicalInput, b: &CanonicalInput) -> bool {
    a.direction != b.direction
}

pub(crate) fn posted_days_diff(a: &CanonicalInput, b: &CanonicalInput) -> i64 {
    days_diff(&a.posted_at, &b.posted_at)
}

pub(crate) fn eligible_by_date(
    context: &RuleContext,
    a: &CanonicalInput,
    b: &CanonicalInput,
) -> bool {
    match context.parameters.max_posted_days_diff {
        None => true,
        Some(max) => posted_days_diff(a, b) <= max,
    }
}

pub(crate) fn has_ref_intersection(a: &CanonicalInput, b: &CanonicalInput) -> bool {
    if a.reference_ids.is_empty() || b.reference_ids.is_empty() {
        return false;
    }
    a.reference_ids.iter().any(|r| b.reference_ids.contains(r))
}

pub(crate) fn balances_to_zero(a: &CanonicalInput, b: &CanonicalInput) -> bool {
    a.signed_converted_amount() + b.signed_converted_amount() == Decimal::ZERO
}

/// `max(tolerance_amount, |base| × tolerance_percent)` over the provided
/// parameters; at least one must be present.
pub(crate) fn computed_tolerance(
    context: &RuleContext,
    base_amount: Decimal,
) -> Result<Decimal, MatchError> {
    let params = &context.parameters;
    if !params.has_tolerance() {
        return Err(MatchError::ToleranceRequired);
    }
    let mut computed = Decimal::ZERO;
    if let Some(amount) = params.tolerance_amount {
        computed = computed.max(amount);
    }
    if let Some(percent) = params.tolerance_percent {
        computed = computed.max(base_amount.abs() * percent);
    }
    Ok(computed)
}
