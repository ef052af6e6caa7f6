//! Shared fixtures for the engine integration suites.

#![allow(dead_code)]

use serde_json::{json, Map, Value};

use ff_core::time::parse_offset_datetime;
use ff_core::{DatasetVersionId, FxArtifactId, RecordId};
use ff_engine::fx_service::create_fx_artifact;
use ff_engine::ingest::ingest_records;
use ff_engine::normalize::normalize_dataset;
use ff_engine::run::{run_engine, RunRequest, RunSummary};
use ff_engine::workflow::{
    transition_workflow_state, Actor, WorkflowState, STAGE_CALCULATE, STAGE_IMPORT,
    STAGE_NORMALIZE, STAGE_REPORT, SUBJECT_LIFECYCLE,
};
use ff_engine::{EngineConfig, EngineError, EngineState, ENGINE_ID};
use ff_io::store::MemoryStore;

pub const SOURCE_SYSTEM: &str = "erp-a";
pub const INGESTED_AT: &str = "2026-01-10T00:00:00Z";
pub const STARTED_AT: &str = "2026-02-01T00:00:00Z";

pub fn record(
    tag: &str,
    record_type: &str,
    direction: &str,
    amount: &str,
    counterparty: &str,
    posted_at: &str,
    refs: &[&str],
) -> Value {
    json!({
        "source_system": SOURCE_SYSTEM,
        "source_record_id": tag,
        "record_type": record_type,
        "posted_at": posted_at,
        "counterparty_id": counterparty,
        "amount_original": amount,
        "currency_original": "USD",
        "direction": direction,
        "reference_ids": refs,
    })
}

pub fn base_params() -> Map<String, Value> {
    json!({
        "rounding_mode": "half_up",
        "rounding_quantum": "0.01",
    })
    .as_object()
    .unwrap()
    .clone()
}

pub struct Pipeline {
    pub state: EngineState,
    pub store: MemoryStore,
    pub config: EngineConfig,
    pub dataset_version_id: DatasetVersionId,
    pub fx_artifact_id: FxArtifactId,
}

/// Ingest + normalize + create the FX artifact, engine enabled.
pub fn pipeline(records: &[Value], base_currency: &str, rates: &[(&str, &str)]) -> Pipeline {
    let mut state = EngineState::new();
    let store = MemoryStore::new();
    let config = EngineConfig::with_enabled_engines([ENGINE_ID]);

    let ingested_at = parse_offset_datetime(INGESTED_AT).unwrap();
    let (dataset_version_id, _) = ingest_records(&mut state, records, ingested_at).unwrap();
    normalize_dataset(&mut state, &dataset_version_id).unwrap();

    let rate_map: Map<String, Value> = rates
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    let fx = create_fx_artifact(
        &mut state,
        &store,
        &dataset_version_id,
        base_currency,
        "2026-01-01",
        &rate_map,
        parse_offset_datetime(STARTED_AT).unwrap(),
    )
    .unwrap();

    Pipeline {
        state,
        store,
        config,
        dataset_version_id,
        fx_artifact_id: fx.fx_artifact_id,
    }
}

pub fn run(p: &mut Pipeline, parameters: Map<String, Value>) -> Result<RunSummary, EngineError> {
    run_with_fx(p, parameters, None)
}

pub fn run_with_fx(
    p: &mut Pipeline,
    parameters: Map<String, Value>,
    fx_artifact_id: Option<&FxArtifactId>,
) -> Result<RunSummary, EngineError> {
    let request = RunRequest {
        dataset_version_id: Some(p.dataset_version_id.to_string()),
        fx_artifact_id: Some(
            fx_artifact_id
                .unwrap_or(&p.fx_artifact_id)
                .to_string(),
        ),
        started_at: Some(STARTED_AT.to_string()),
        parameters,
    };
    run_engine(&mut p.state, &p.store, &p.config, &request)
}

/// Canonical record id for one of this suite's source rows.
pub fn rid(p: &Pipeline, tag: &str) -> String {
    RecordId::derive(&p.dataset_version_id, SOURCE_SYSTEM, tag)
        .unwrap()
        .to_string()
}

/// Approve the lifecycle stages a report read requires.
pub fn approve_report_stages(p: &mut Pipeline) {
    let admin = Actor {
        actor_id: "auditor-1".to_string(),
        is_admin: true,
    };
    let at = parse_offset_datetime(STARTED_AT).unwrap();
    for stage in [STAGE_IMPORT, STAGE_NORMALIZE, STAGE_CALCULATE, STAGE_REPORT] {
        for target in [WorkflowState::Review, WorkflowState::Approved] {
            transition_workflow_state(
                &mut p.state,
                &p.dataset_version_id,
                SUBJECT_LIFECYCLE,
                stage,
                target,
                &admin,
                Some("test"),
                at,
            )
            .unwrap();
        }
    }
}
