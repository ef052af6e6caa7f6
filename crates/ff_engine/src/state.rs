//! Engine-owned registries.
//!
//! Tables are append-only: rows are inserted once under deterministic ids and
//! never mutated or deleted (the single exception is a workflow state's
//! `current_state`, whose history lives in the append-only transition log).
//! A run's writes are staged into `RunWrites` and applied atomically by
//! `commit_run`; a failed run therefore leaves no persisted state.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use ff_core::{
    DatasetVersionId, EvidenceId, FindingId, FxArtifactId, LeakageItemId, RawRecordId, RecordId,
    RunId,
};
use ff_match::framework::{Confidence, FindingType};
use ff_match::leakage::Typology;
use ff_match::CanonicalRecord;

use crate::audit::AuditRecord;
use crate::workflow::WorkflowState;
use crate::EngineError;

// ------------------------------------------------------------------ rows ----

#[derive(Clone, Debug, PartialEq)]
pub struct DatasetVersionRow {
    pub id: DatasetVersionId,
    pub created_at: DateTime<FixedOffset>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawRecordRow {
    pub raw_record_id: RawRecordId,
    pub dataset_version_id: DatasetVersionId,
    pub source_system: String,
    pub source_record_id: String,
    pub payload: serde_json::Map<String, Value>,
    pub ingested_at: DateTime<FixedOffset>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FxArtifactRow {
    pub fx_artifact_id: FxArtifactId,
    pub dataset_version_id: DatasetVersionId,
    pub base_currency: String,
    pub effective_date: String,
    pub checksum: String,
    pub artifact_uri: String,
    pub created_at: DateTime<FixedOffset>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunRow {
    pub run_id: RunId,
    pub dataset_version_id: DatasetVersionId,
    pub fx_artifact_id: FxArtifactId,
    pub started_at: DateTime<FixedOffset>,
    pub status: String,
    pub parameters: Value,
    pub engine_version: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FindingRow {
    pub finding_id: FindingId,
    pub run_id: RunId,
    pub dataset_version_id: DatasetVersionId,
    pub fx_artifact_id: FxArtifactId,
    pub rule_id: String,
    pub rule_version: String,
    pub framework_version: String,
    pub finding_type: FindingType,
    pub confidence: Confidence,
    pub matched_record_ids: Vec<RecordId>,
    pub unmatched_amount: Option<Decimal>,
    pub primary_evidence_id: EvidenceId,
    pub evidence_ids: Vec<EvidenceId>,
    pub created_at: DateTime<FixedOffset>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeakageItemRow {
    pub leakage_item_id: LeakageItemId,
    pub run_id: RunId,
    pub finding_id: FindingId,
    pub dataset_version_id: DatasetVersionId,
    pub typology: Typology,
    pub exposure_abs: Decimal,
    pub exposure_signed: Decimal,
    pub created_at: DateTime<FixedOffset>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EvidenceRow {
    pub evidence_id: EvidenceId,
    pub dataset_version_id: DatasetVersionId,
    pub engine_id: String,
    pub kind: String,
    pub payload: Value,
    /// SHA-256 of the canonical payload bytes; what "identical payload" means.
    pub payload_sha256: String,
    pub created_at: DateTime<FixedOffset>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowStateRow {
    pub workflow_state_id: String,
    pub dataset_version_id: DatasetVersionId,
    pub subject_type: String,
    pub subject_id: String,
    pub current_state: WorkflowState,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkflowTransitionRow {
    pub transition_id: String,
    pub dataset_version_id: String,
    pub subject_type: String,
    pub subject_id: String,
    pub from_state: String,
    pub to_state: String,
    pub actor_id: Option<String>,
    pub reason: Option<String>,
    /// Derived prerequisite flags at transition time.
    pub has_evidence: bool,
    pub has_approval: bool,
    pub created_at: String,
}

// ----------------------------------------------------------------- state ----

/// The engine-owned tables plus the core registries, in-memory.
#[derive(Default)]
pub struct EngineState {
    datasets: BTreeMap<DatasetVersionId, DatasetVersionRow>,
    raw_records: BTreeMap<RawRecordId, RawRecordRow>,
    canonical_records: BTreeMap<RecordId, CanonicalRecord>,
    fx_artifacts: BTreeMap<FxArtifactId, FxArtifactRow>,
    runs: BTreeMap<RunId, RunRow>,
    findings: BTreeMap<FindingId, FindingRow>,
    leakage_items: BTreeMap<LeakageItemId, LeakageItemRow>,
    evidence: BTreeMap<EvidenceId, EvidenceRow>,
    workflow_states: BTreeMap<(DatasetVersionId, String, String), WorkflowStateRow>,
    workflow_transitions: Vec<WorkflowTransitionRow>,
    audit_log: Vec<AuditRecord>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    // -- datasets --

    pub fn insert_dataset(&mut self, row: DatasetVersionRow) {
        self.datasets.entry(row.id.clone()).or_insert(row);
    }

    pub fn dataset_exists(&self, id: &DatasetVersionId) -> bool {
        self.datasets.contains_key(id)
    }

    // -- raw records --

    pub fn insert_raw_record(&mut self, row: RawRecordRow) {
        self.raw_records.entry(row.raw_record_id.clone()).or_insert(row);
    }

    /// Raw rows for a dataset, ordered by `(ingested_at, raw_record_id)`.
    pub fn raw_records_for_dataset(&self, id: &DatasetVersionId) -> Vec<&RawRecordRow> {
        let mut rows: Vec<&RawRecordRow> = self
            .raw_records
            .values()
            .filter(|r| &r.dataset_version_id == id)
            .collect();
        rows.sort_by_key(|r| (r.ingested_at, r.raw_record_id.clone()));
        rows
    }

    // -- canonical records --

    pub fn canonical_exists(&self, id: &RecordId) -> bool {
        self.canonical_records.contains_key(id)
    }

    pub fn insert_canonical_record(&mut self, record: CanonicalRecord) {
        self.canonical_records
            .entry(record.record_id.clone())
            .or_insert(record);
    }

    /// Canonical rows for a dataset, ordered by record_id (map order).
    pub fn canonical_for_dataset(&self, id: &DatasetVersionId) -> Vec<&CanonicalRecord> {
        self.canonical_records
            .values()
            .filter(|r| &r.dataset_version_id == id)
            .collect()
    }

    // -- fx artifacts --

    pub fn insert_fx_artifact(&mut self, row: FxArtifactRow) {
        self.fx_artifacts
            .entry(row.fx_artifact_id.clone())
            .or_insert(row);
    }

    pub fn fx_artifact(&self, id: &FxArtifactId) -> Option<&FxArtifactRow> {
        self.fx_artifacts.get(id)
    }

    pub fn fx_artifact_by_checksum(
        &self,
        dataset_version_id: &DatasetVersionId,
        checksum: &str,
    ) -> Option<&FxArtifactRow> {
        self.fx_artifacts
            .values()
            .find(|row| &row.dataset_version_id == dataset_version_id && row.checksum == checksum)
    }

    // -- runs / findings / leakage / evidence --

    pub fn run(&self, id: &RunId) -> Option<&RunRow> {
        self.runs.get(id)
    }

    pub fn finding(&self, id: &FindingId) -> Option<&FindingRow> {
        self.findings.get(id)
    }

    /// Findings for a run, ordered by `(rule_id, finding_id)`.
    pub fn findings_for_run(&self, run_id: &RunId) -> Vec<&FindingRow> {
        let mut rows: Vec<&FindingRow> = self
            .findings
            .values()
            .filter(|f| &f.run_id == run_id)
            .collect();
        rows.sort_by_key(|f| (f.rule_id.clone(), f.finding_id.clone()));
        rows
    }

    /// Leakage items for a run, ordered by `(typology, finding_id)`.
    pub fn leakage_for_run(&self, run_id: &RunId) -> Vec<&LeakageItemRow> {
        let mut rows: Vec<&LeakageItemRow> = self
            .leakage_items
            .values()
            .filter(|l| &l.run_id == run_id)
            .collect();
        rows.sort_by_key(|l| (l.typology, l.finding_id.clone()));
        rows
    }

    pub fn evidence(&self, id: &EvidenceId) -> Option<&EvidenceRow> {
        self.evidence.get(id)
    }

    pub fn any_run_for_dataset(&self, dataset_version_id: &DatasetVersionId) -> bool {
        self.runs
            .values()
            .any(|r| &r.dataset_version_id == dataset_version_id)
    }

    pub fn any_run_with_findings(&self, dataset_version_id: &DatasetVersionId) -> bool {
        self.findings
            .values()
            .any(|f| &f.dataset_version_id == dataset_version_id)
    }

    pub fn counts(&self) -> RegistryCounts {
        RegistryCounts {
            datasets: self.datasets.len(),
            raw_records: self.raw_records.len(),
            canonical_records: self.canonical_records.len(),
            fx_artifacts: self.fx_artifacts.len(),
            runs: self.runs.len(),
            findings: self.findings.len(),
            leakage_items: self.leakage_items.len(),
            evidence: self.evidence.len(),
            workflow_transitions: self.workflow_transitions.len(),
            audit_records: self.audit_log.len(),
        }
    }

    // -- workflow --

    pub fn workflow_state(
        &self,
        dataset_version_id: &DatasetVersionId,
        subject_type: &str,
        subject_id: &str,
    ) -> Option<&WorkflowStateRow> {
        self.workflow_states.get(&(
            dataset_version_id.clone(),
            subject_type.to_string(),
            subject_id.to_string(),
        ))
    }

    pub(crate) fn put_workflow_state(&mut self, row: WorkflowStateRow) {
        self.workflow_states.insert(
            (
                row.dataset_version_id.clone(),
                row.subject_type.clone(),
                row.subject_id.clone(),
            ),
            row,
        );
    }

    pub(crate) fn push_workflow_transition(&mut self, row: WorkflowTransitionRow) {
        self.workflow_transitions.push(row);
    }

    pub fn workflow_transitions_for_subject(
        &self,
        dataset_version_id: &DatasetVersionId,
        subject_type: &str,
        subject_id: &str,
    ) -> Vec<&WorkflowTransitionRow> {
        self.workflow_transitions
            .iter()
            .filter(|t| {
                t.dataset_version_id == dataset_version_id.as_str()
                    && t.subject_type == subject_type
                    && t.subject_id == subject_id
            })
            .collect()
    }

    // -- audit --

    pub(crate) fn push_audit(&mut self, record: AuditRecord) {
        self.audit_log.push(record);
    }

    pub fn audit_log(&self) -> &[AuditRecord] {
        &self.audit_log
    }

    // -- atomic run commit --

    /// Apply a staged run atomically. All conflict checks were performed at
    /// staging time against the same state; inserts here are or-insert so a
    /// replay converges to zero new rows.
    pub fn commit_run(&mut self, writes: RunWrites) -> Result<(), EngineError> {
        if let Some(existing) = self.runs.get(&writes.run.run_id) {
            if existing != &writes.run {
                return Err(EngineError::InconsistentReference(format!(
                    "RUN_ROW_MISMATCH: {}",
                    writes.run.run_id
                )));
            }
        }
        for row in &writes.evidence {
            if let Some(existing) = self.evidence.get(&row.evidence_id) {
                if existing.payload_sha256 != row.payload_sha256 {
                    return Err(EngineError::InconsistentReference(format!(
                        "EVIDENCE_ROW_MISMATCH: {}",
                        row.evidence_id
                    )));
                }
            }
        }

        self.runs
            .entry(writes.run.run_id.clone())
            .or_insert(writes.run);
        for row in writes.evidence {
            self.evidence.entry(row.evidence_id.clone()).or_insert(row);
        }
        for row in writes.findings {
            self.findings.entry(row.finding_id.clone()).or_insert(row);
        }
        for row in writes.leakage {
            self.leakage_items
                .entry(row.leakage_item_id.clone())
                .or_insert(row);
        }
        Ok(())
    }
}

/// Staged writes for one run.
#[derive(Debug)]
pub struct RunWrites {
    pub run: RunRow,
    pub findings: Vec<FindingRow>,
    pub leakage: Vec<LeakageItemRow>,
    pub evidence: Vec<EvidenceRow>,
}

/// Row counts across every registry; lets tests assert "zero new rows".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegistryCounts {
    pub datasets: usize,
    pub raw_records: usize,
    pub canonical_records: usize,
    pub fx_artifacts: usize,
    pub runs: usize,
    pub findings: usize,
    pub leakage_items: usize,
    pub evidence: usize,
    pub workflow_transitions: usize,
    pub audit_records: usize,
}
