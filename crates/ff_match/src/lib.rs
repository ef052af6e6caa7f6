//! ff_match — the pure algorithm layer of the forensics engine.
//!
//! Everything in this crate is a function of its inputs: no I/O, no clock, no
//! RNG, no global state. The engine crate owns persistence; this crate owns
//! the semantics:
//!
//! - canonical normalization (raw payload → canonical record, no enrichment)
//! - FX conversion with explicit rounding mode and quantum
//! - the matching framework, orchestrator, and concrete rules
//! - the evidence schema v1 typed builder and payload validator
//! - leakage typology classification and exposure derivation

#![forbid(unsafe_code)]

pub mod evidence_schema;
pub mod framework;
pub mod fx_convert;
pub mod leakage;
pub mod normalize;
pub mod orchestrator;
pub mod rules;

pub use framework::{
    CanonicalInput, Confidence, ConvertedAmounts, FindingType, MatchError, MatchOutcome,
    MatchSelection, MatchingRule, RuleContext, RuleParameters, FRAMEWORK_VERSION,
};
pub use normalize::{normalize_record, CanonicalRecord, NormalizeError};
pub use orchestrator::{run_matching, OrchestrationLog};
