//! ff_engine — the stateful half of the forensics engine.
//!
//! Owns the append-only registries (the engine-owned "tables"), the FX
//! artifact service, the evidence registry, workflow + lifecycle state
//! machines, the audit log, ingestion, and the run driver. All semantics live
//! in `ff_match`; this crate wires them to durable state.
//!
//! Writes for a run are staged first and committed atomically; any error
//! leaves no persisted state for that run.

#![forbid(unsafe_code)]

use thiserror::Error;

pub mod audit;
pub mod config;
pub mod evidence;
pub mod fx_service;
pub mod ingest;
pub mod limits;
pub mod normalize;
pub mod report;
pub mod run;
pub mod state;
pub mod workflow;

pub use config::EngineConfig;
pub use state::EngineState;

pub const ENGINE_ID: &str = "engine_financial_forensics";
pub const ENGINE_VERSION: &str = "v1";

/// Engine-level error taxonomy. Kinds, not types: every variant carries a
/// stable textual code in its `Display` output, and `http_status` gives the
/// transport mapping for callers that need one.
#[derive(Debug, Error)]
pub enum EngineError {
    // ---- input validation ----
    #[error("ENGINE_DISABLED: engine {0} is disabled; enable via TODISCOPE_ENABLED_ENGINES")]
    EngineDisabled(String),

    #[error("DATASET_VERSION_ID_REQUIRED: dataset_version_id must be provided")]
    DatasetVersionMissing,

    #[error("DATASET_VERSION_ID_INVALID: {0}")]
    DatasetVersionInvalid(String),

    #[error("DATASET_VERSION_NOT_FOUND: dataset_version_id '{0}' does not exist")]
    DatasetVersionNotFound(String),

    #[error("FX_ARTIFACT_ID_REQUIRED")]
    FxArtifactMissing,

    #[error("FX_ARTIFACT_INVALID: {0}")]
    FxArtifactInvalid(String),

    #[error("FX_ARTIFACT_NOT_FOUND: {0}")]
    FxArtifactNotFound(String),

    #[error("STARTED_AT_REQUIRED")]
    StartedAtMissing,

    #[error("STARTED_AT_INVALID: {0}")]
    StartedAtInvalid(String),

    #[error("ROUNDING_MODE_REQUIRED")]
    RoundingModeRequired,

    #[error("ROUNDING_QUANTUM_REQUIRED")]
    RoundingQuantumRequired,

    #[error("RUN_PARAMETER_INVALID: {0}")]
    ParameterInvalid(String),

    #[error("RECORD_FIELD_MISSING: {0}")]
    RecordFieldMissing(String),

    #[error("RECORD_INVALID_TYPE: ingest records must be JSON objects")]
    RecordInvalidType,

    // ---- runtime ----
    #[error("RUNTIME_LIMIT_INVALID: {0}")]
    RuntimeLimitInvalid(String),

    #[error("RUNTIME_LIMIT_EXCEEDED: {0}")]
    RuntimeLimitExceeded(&'static str),

    #[error("MISSING_ARTIFACT: {0}")]
    MissingArtifact(String),

    #[error("INCONSISTENT_REFERENCE: {0}")]
    InconsistentReference(String),

    #[error("PARTIAL_RUN: {0}")]
    PartialRun(String),

    // ---- wrapped domain errors ----
    #[error(transparent)]
    Core(#[from] ff_core::CoreError),

    #[error(transparent)]
    Io(#[from] ff_io::IoError),

    #[error(transparent)]
    Fx(#[from] ff_io::fx::FxError),

    #[error(transparent)]
    Normalize(#[from] ff_match::NormalizeError),

    #[error(transparent)]
    Convert(#[from] ff_match::fx_convert::ConvertError),

    #[error(transparent)]
    Match(#[from] ff_match::MatchError),

    #[error(transparent)]
    Evidence(#[from] evidence::EvidenceError),

    #[error(transparent)]
    Workflow(#[from] workflow::WorkflowError),
}

impl EngineError {
    /// Transport mapping for the exposed contract. HTTP itself is out of
    /// scope; collaborators consume this hint.
    pub fn http_status(&self) -> u16 {
        use EngineError::*;
        match self {
            EngineDisabled(_) => 503,
            DatasetVersionNotFound(_) | FxArtifactNotFound(_) | MissingArtifact(_) => 404,
            RuntimeLimitExceeded(_) => 413,
            InconsistentReference(_) => 409,
            DatasetVersionMissing
            | DatasetVersionInvalid(_)
            | FxArtifactMissing
            | FxArtifactInvalid(_)
            | StartedAtMissing
            | StartedAtInvalid(_)
            | RoundingModeRequired
            | RoundingQuantumRequired
            | ParameterInvalid(_)
            | RecordFieldMissing(_)
            | RecordInvalidType
            | RuntimeLimitInvalid(_)
            | Core(_)
            | Fx(_)
            | Normalize(_)
            | Convert(_) => 400,
            Workflow(_) => 409,
            PartialRun(_) | Io(_) | Match(_) | Evidence(_) => 500,
        }
    }
}
