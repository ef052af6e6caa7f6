//! Report assembly.
//!
//! Deterministic sections over a completed run, gated by the lifecycle state
//! machine: the dataset's `report` stage must be approved. Every collection
//! is explicitly sorted, and rendering goes through the canonical JSON
//! writer, so identical inputs produce byte-identical reports.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;

use ff_core::amounts::format_plain;
use ff_core::time::to_iso;
use ff_core::{DatasetVersionId, EvidenceId, RunId};
use ff_report::{
    section_evidence_index, section_executive_overview, section_exposure_summary,
    section_findings_table, section_leakage_breakdown, EvidenceIndexItem, FindingReportRow,
    ReportDoc, Sections, Totals, TypologyRow,
};

use crate::limits::limits_from_parameters;
use crate::state::EngineState;
use crate::workflow::{require_stage_approved, STAGE_REPORT};
use crate::{EngineError, ENGINE_ID};

/// Assemble the report for (dataset, run).
pub fn assemble_report(
    state: &mut EngineState,
    dataset_version_id: &DatasetVersionId,
    run_id: &RunId,
    parameters: &serde_json::Map<String, serde_json::Value>,
    at: DateTime<FixedOffset>,
) -> Result<ReportDoc, EngineError> {
    let limits = limits_from_parameters(parameters)?;

    let run = state
        .run(run_id)
        .ok_or_else(|| EngineError::MissingArtifact("RUN_NOT_FOUND".to_string()))?
        .clone();
    if &run.dataset_version_id != dataset_version_id {
        return Err(EngineError::InconsistentReference(
            "RUN_DATASET_MISMATCH".to_string(),
        ));
    }

    require_stage_approved(state, dataset_version_id, STAGE_REPORT, "report_assembly", at)?;

    let findings: Vec<_> = state
        .findings_for_run(run_id)
        .into_iter()
        .cloned()
        .collect();
    if findings.len() > limits.max_report_findings {
        return Err(EngineError::RuntimeLimitExceeded("max_report_findings"));
    }

    let leakage: Vec<_> = state.leakage_for_run(run_id).into_iter().cloned().collect();
    if leakage.len() != findings.len() {
        return Err(EngineError::MissingArtifact(
            "MISSING_LEAKAGE_ITEMS_FOR_RUN".to_string(),
        ));
    }

    // Every referenced bundle must resolve inside this dataset before any
    // section is built.
    crate::evidence::verify_evidence_traceability(state, dataset_version_id, run_id).map_err(
        |err| match err {
            crate::evidence::EvidenceError::DatasetVersionMismatch(id) => {
                EngineError::InconsistentReference(format!("EVIDENCE_DATASET_MISMATCH: {id}"))
            }
            _ => EngineError::MissingArtifact("MISSING_EVIDENCE_FOR_RUN".to_string()),
        },
    )?;
    let leakage_by_finding: BTreeMap<_, _> =
        leakage.iter().map(|l| (l.finding_id.clone(), l)).collect();

    // Evidence index over the findings' primary bundles, sorted by id.
    let mut evidence_ids: Vec<EvidenceId> = findings
        .iter()
        .map(|f| f.primary_evidence_id.clone())
        .collect();
    evidence_ids.sort();
    evidence_ids.dedup();
    let mut evidence_items = Vec::with_capacity(evidence_ids.len());
    for id in &evidence_ids {
        let row = state.evidence(id).ok_or_else(|| {
            EngineError::MissingArtifact("MISSING_EVIDENCE_FOR_RUN".to_string())
        })?;
        evidence_items.push(EvidenceIndexItem {
            evidence_id: row.evidence_id.to_string(),
            kind: row.kind.clone(),
            engine_id: row.engine_id.clone(),
            sha256: row.payload_sha256.clone(),
            created_at: to_iso(&row.created_at),
        });
    }

    // Leakage rollups by typology, sorted.
    let mut buckets: BTreeMap<&'static str, (usize, Decimal)> = BTreeMap::new();
    let mut total_exposure = Decimal::ZERO;
    for item in &leakage {
        let entry = buckets
            .entry(item.typology.as_str())
            .or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += item.exposure_abs;
        total_exposure += item.exposure_abs;
    }
    let by_typology = buckets
        .into_iter()
        .map(|(typology, (count, total))| TypologyRow {
            typology: typology.to_string(),
            finding_count: count,
            total_exposure_abs: format_plain(&total),
        })
        .collect();

    let rows = findings
        .iter()
        .map(|f| {
            let item = leakage_by_finding
                .get(&f.finding_id)
                .expect("leakage presence checked above");
            FindingReportRow {
                finding_id: f.finding_id.to_string(),
                rule_id: f.rule_id.clone(),
                rule_version: f.rule_version.clone(),
                framework_version: f.framework_version.clone(),
                confidence: f.confidence.as_str().to_string(),
                finding_type: f.finding_type.as_str().to_string(),
                matched_record_ids: f
                    .matched_record_ids
                    .iter()
                    .map(|r| r.to_string())
                    .collect(),
                unmatched_amount: f.unmatched_amount.map(|d| format_plain(&d)),
                typology: item.typology.as_str().to_string(),
                exposure_abs: format_plain(&item.exposure_abs),
                exposure_signed: format_plain(&item.exposure_signed),
                primary_evidence_id: f.primary_evidence_id.to_string(),
            }
        })
        .collect();

    let totals = Totals {
        finding_count: findings.len(),
        total_exposure_abs: format_plain(&total_exposure),
    };
    Ok(ReportDoc {
        engine_id: ENGINE_ID.to_string(),
        engine_version: run.engine_version.clone(),
        dataset_version_id: dataset_version_id.to_string(),
        run_id: run_id.to_string(),
        sections: Sections {
            executive_overview: section_executive_overview(
                dataset_version_id.as_str(),
                run_id.as_str(),
                totals,
            ),
            leakage_breakdown: section_leakage_breakdown(by_typology),
            exposure_summary: section_exposure_summary(format_plain(&total_exposure)),
            findings_table: section_findings_table(rows),
            evidence_index: section_evidence_index(evidence_items),
        },
    })
}
