// ff — CLI entrypoint.
//
// Drives the fixed pipeline end-to-end from a manifest: ingest → normalize →
// fx artifact → run → lifecycle approvals → report, then writes canonical
// artifacts. Strictly offline and deterministic: no network, no OS RNG in
// the engine paths, every timestamp comes from the manifest.

mod args;

use std::process::ExitCode;

use camino::Utf8Path;
use serde::Deserialize;
use serde_json::Value;

use args::{parse_and_validate, Args, CliError};
use ff_core::time::parse_offset_datetime;
use ff_core::{DatasetVersionId, RunId};
use ff_engine::config::StoreKind;
use ff_engine::fx_service::create_fx_artifact;
use ff_engine::ingest::ingest_records;
use ff_engine::normalize::normalize_dataset;
use ff_engine::report::assemble_report;
use ff_engine::run::{run_engine, RunRequest};
use ff_engine::workflow::{
    transition_workflow_state, Actor, WorkflowState, STAGE_CALCULATE, STAGE_IMPORT,
    STAGE_NORMALIZE, STAGE_REPORT, SUBJECT_LIFECYCLE,
};
use ff_engine::{EngineConfig, EngineState, ENGINE_ID};
use ff_io::canonical_json::{to_canonical_bytes, write_bytes_atomic};
use ff_io::store::{ArtifactStore, FsStore, MemoryStore};

const RUN_SUMMARY_FILE: &str = "run_summary.json";
const REPORT_FILE: &str = "report.json";

/// Everything one pipeline invocation needs, supplied by the operator.
#[derive(Debug, Deserialize)]
struct Manifest {
    records: Vec<Value>,
    ingested_at: String,
    fx: FxSpec,
    started_at: String,
    #[serde(default)]
    parameters: serde_json::Map<String, Value>,
    actor: ActorSpec,
}

#[derive(Debug, Deserialize)]
struct FxSpec {
    base_currency: String,
    effective_date: String,
    rates: serde_json::Map<String, Value>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActorSpec {
    actor_id: String,
    #[serde(default)]
    admin: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_and_validate() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("ff: error: {e}");
            return ExitCode::from(1);
        }
    };

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ff: error: {e}");
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<ExitCode, String> {
    std::fs::create_dir_all(args.out.as_std_path())
        .map_err(|e| format!("cannot create output directory {}: {e}", args.out))?;

    let manifest = load_manifest(&args.manifest).map_err(|e| e.to_string())?;

    let mut config = EngineConfig::from_env();
    for engine_id in &args.enable {
        config.enable_engine(engine_id);
    }
    if !config.is_engine_enabled(ENGINE_ID) {
        tracing::warn!(
            engine = ENGINE_ID,
            "engine is not enabled; pass --enable or set TODISCOPE_ENABLED_ENGINES"
        );
    }

    let store: Box<dyn ArtifactStore> = match config.artifact_store_kind {
        StoreKind::Memory => Box::new(MemoryStore::new()),
        StoreKind::Filesystem => Box::new(FsStore::new(args.out.join("artifacts"))),
    };

    let mut state = EngineState::new();
    let actor = Actor {
        actor_id: manifest.actor.actor_id.clone(),
        is_admin: manifest.actor.admin,
    };

    // Ingest + normalize.
    let ingested_at = parse_offset_datetime(&manifest.ingested_at)
        .map_err(|e| format!("manifest.ingested_at: {e}"))?;
    let (dataset_version_id, raw_count) =
        ingest_records(&mut state, &manifest.records, ingested_at)
            .map_err(|e| format!("ingest: {e}"))?;
    let canonical_count = normalize_dataset(&mut state, &dataset_version_id)
        .map_err(|e| format!("normalize: {e}"))?;

    // FX artifact.
    let fx_created_at = manifest
        .fx
        .created_at
        .as_deref()
        .unwrap_or(&manifest.started_at);
    let fx_created_at =
        parse_offset_datetime(fx_created_at).map_err(|e| format!("fx.created_at: {e}"))?;
    let fx_row = create_fx_artifact(
        &mut state,
        store.as_ref(),
        &dataset_version_id,
        &manifest.fx.base_currency,
        &manifest.fx.effective_date,
        &manifest.fx.rates,
        fx_created_at,
    )
    .map_err(|e| format!("fx artifact: {e}"))?;

    // Run.
    let request = RunRequest {
        dataset_version_id: Some(dataset_version_id.to_string()),
        fx_artifact_id: Some(fx_row.fx_artifact_id.to_string()),
        started_at: Some(manifest.started_at.clone()),
        parameters: manifest.parameters.clone(),
    };
    let summary = run_engine(&mut state, store.as_ref(), &config, &request)
        .map_err(|e| format!("run: {e}"))?;

    let summary_bytes =
        to_canonical_bytes(&summary).map_err(|e| format!("serialize summary: {e}"))?;
    write_bytes_atomic(args.out.join(RUN_SUMMARY_FILE).as_std_path(), &summary_bytes)
        .map_err(|e| format!("write {}: {e}", RUN_SUMMARY_FILE))?;

    if !args.no_report {
        approve_report_stages(&mut state, &dataset_version_id, &actor, &manifest.started_at)
            .map_err(|e| format!("lifecycle: {e}"))?;

        let run_id: RunId = summary
            .run_id
            .parse()
            .map_err(|e| format!("run id: {e:?}"))?;
        let started_at = parse_offset_datetime(&manifest.started_at)
            .map_err(|e| format!("manifest.started_at: {e}"))?;
        let report = assemble_report(
            &mut state,
            &dataset_version_id,
            &run_id,
            &manifest.parameters,
            started_at,
        )
        .map_err(|e| format!("report: {e}"))?;
        let report_bytes = report
            .render_canonical_bytes()
            .map_err(|e| format!("render report: {e}"))?;
        write_bytes_atomic(args.out.join(REPORT_FILE).as_std_path(), &report_bytes)
            .map_err(|e| format!("write {}: {e}", REPORT_FILE))?;
    }

    if !args.quiet {
        println!(
            "dataset={dataset_version_id} raw={raw_count} canonical={canonical_count} run={} findings={}",
            summary.run_id,
            summary.findings.len()
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// Walk the lifecycle stages a report read requires: each stage goes
/// draft → review → approved under the manifest's actor.
fn approve_report_stages(
    state: &mut EngineState,
    dataset_version_id: &DatasetVersionId,
    actor: &Actor,
    started_at: &str,
) -> Result<(), String> {
    let at = parse_offset_datetime(started_at).map_err(|e| e.to_string())?;
    for stage in [STAGE_IMPORT, STAGE_NORMALIZE, STAGE_CALCULATE, STAGE_REPORT] {
        for target in [WorkflowState::Review, WorkflowState::Approved] {
            transition_workflow_state(
                state,
                dataset_version_id,
                SUBJECT_LIFECYCLE,
                stage,
                target,
                actor,
                Some("pipeline"),
                at,
            )
            .map_err(|e| format!("stage {stage}: {e}"))?;
        }
    }
    Ok(())
}

fn load_manifest(path: &Utf8Path) -> Result<Manifest, CliError> {
    let bytes =
        std::fs::read(path.as_std_path()).map_err(|e| CliError::Io(format!("{path}: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| CliError::Manifest(e.to_string()))
}
