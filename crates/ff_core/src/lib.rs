//! ff_core — Core types, domains, and ordering guarantees for the forensics engine.
//!
//! This crate is **I/O-free**. It defines stable types/APIs used across the
//! workspace (`ff_io`, `ff_match`, `ff_engine`, `ff_report`, `ff_cli`).
//!
//! - Deterministic IDs: fixed namespace UUIDs + canonical key strings
//! - Record domains: `RecordType`, `Direction`, ISO 4217 currency set
//! - Exact decimal helpers: parsing, plain formatting, quantization
//! - Timestamp parsing: offset-aware only, wall clock never consulted
//!
//! No RNG, no floats in money paths, no system time.

#![forbid(unsafe_code)]

pub mod amounts;
pub mod currency;
pub mod errors;
pub mod ids;
pub mod records;
pub mod time;

pub use errors::CoreError;
pub use ids::{
    deterministic_id, DatasetVersionId, EvidenceId, FindingId, FxArtifactId, LeakageItemId,
    RawRecordId, RecordId, RunId,
};
pub use records::{Direction, RecordType};
