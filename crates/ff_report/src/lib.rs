//! ff_report — pure offline report model + canonical JSON renderer.
//!
//! Determinism rules:
//! - No I/O here. The engine assembles the model from its registries and
//!   hands it over fully sorted; this crate only shapes and renders it.
//! - Stable section order and field names.
//! - Rendering goes through the canonical JSON writer, so identical inputs
//!   produce byte-identical output.

#![forbid(unsafe_code)]

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("REPORT_RENDER_FAILED: {0}")]
    Render(String),
}

/// Top-level report document.
#[derive(Clone, Debug, Serialize)]
pub struct ReportDoc {
    pub engine_id: String,
    pub engine_version: String,
    pub dataset_version_id: String,
    pub run_id: String,
    pub sections: Sections,
}

/// Fixed section order: executive totals, leakage breakdown, exposure
/// summary, detailed findings, evidence index.
#[derive(Clone, Debug, Serialize)]
pub struct Sections {
    pub executive_overview: ExecutiveOverview,
    pub leakage_breakdown: LeakageBreakdown,
    pub exposure_summary: ExposureSummary,
    pub findings_table: FindingsTable,
    pub evidence_index: EvidenceIndex,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExecutiveOverview {
    pub title: String,
    pub dataset_version_id: String,
    pub run_id: String,
    pub totals: Totals,
}

#[derive(Clone, Debug, Serialize)]
pub struct Totals {
    pub finding_count: usize,
    pub total_exposure_abs: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeakageBreakdown {
    pub title: String,
    /// Sorted by typology.
    pub by_typology: Vec<TypologyRow>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TypologyRow {
    pub typology: String,
    pub finding_count: usize,
    pub total_exposure_abs: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExposureSummary {
    pub title: String,
    pub total_exposure_abs: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct FindingsTable {
    pub title: String,
    /// Sorted by (rule_id, finding_id).
    pub rows: Vec<FindingReportRow>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FindingReportRow {
    pub finding_id: String,
    pub rule_id: String,
    pub rule_version: String,
    pub framework_version: String,
    pub confidence: String,
    pub finding_type: String,
    pub matched_record_ids: Vec<String>,
    pub unmatched_amount: Option<String>,
    pub typology: String,
    pub exposure_abs: String,
    pub exposure_signed: String,
    pub primary_evidence_id: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct EvidenceIndex {
    pub title: String,
    /// Sorted by evidence_id.
    pub items: Vec<EvidenceIndexItem>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EvidenceIndexItem {
    pub evidence_id: String,
    pub kind: String,
    pub engine_id: String,
    pub sha256: String,
    pub created_at: String,
}

pub fn section_executive_overview(
    dataset_version_id: &str,
    run_id: &str,
    totals: Totals,
) -> ExecutiveOverview {
    ExecutiveOverview {
        title: "Executive Overview".to_string(),
        dataset_version_id: dataset_version_id.to_string(),
        run_id: run_id.to_string(),
        totals,
    }
}

pub fn section_leakage_breakdown(by_typology: Vec<TypologyRow>) -> LeakageBreakdown {
    LeakageBreakdown {
        title: "Leakage Breakdown".to_string(),
        by_typology,
    }
}

pub fn section_exposure_summary(total_exposure_abs: String) -> ExposureSummary {
    ExposureSummary {
        title: "Exposure Summary".to_string(),
        total_exposure_abs,
    }
}

pub fn section_findings_table(rows: Vec<FindingReportRow>) -> FindingsTable {
    FindingsTable {
        title: "Detailed Findings (Appendix)".to_string(),
        rows,
    }
}

pub fn section_evidence_index(items: Vec<EvidenceIndexItem>) -> EvidenceIndex {
    EvidenceIndex {
        title: "Evidence Index".to_string(),
        items,
    }
}

impl ReportDoc {
    /// Canonical bytes: sorted keys, compact, UTF-8. Byte-identical for
    /// identical inputs.
    pub fn render_canonical_bytes(&self) -> Result<Vec<u8>, ReportError> {
        ff_io::canonical_json::to_canonical_bytes(self).map_err(|e| ReportError::Render(e.to_string()))
    }
}
