//! Engine driver.
//!
//! Validate inputs → load canonical records → convert → orchestrate rules →
//! emit evidence/findings/leakage → commit → return a deterministically
//! ordered summary. The run id is derived from the dataset, engine identity,
//! and a canonical hash of the parameter map, so identical requests are
//! idempotent and converge on the same rows.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use ff_core::amounts::{format_plain, RoundingSpec};
use ff_core::time::{parse_offset_datetime, to_iso};
use ff_core::{DatasetVersionId, FindingId, FxArtifactId, LeakageItemId, RecordId, RunId};
use ff_io::canonical_json::to_canonical_json_bytes;
use ff_io::hasher::sha256_hex;
use ff_io::store::ArtifactStore;
use ff_match::evidence_schema::EvidenceSchemaV1;
use ff_match::framework::{
    CanonicalInput, ConvertedAmounts, FindingType, MatchOutcome, MatchingRule, RuleContext,
    RuleParameters, FRAMEWORK_VERSION,
};
use ff_match::fx_convert::convert_amount;
use ff_match::leakage::{
    classify_finding, derive_exposure, Classification, Exposure, ExposureDerivationEvidence,
    FindingReferencesEvidence, LeakageEvidenceSchemaV1, LeakageInputs, PrimaryRecordsEvidence,
    TypologyAssignmentEvidence,
};
use ff_match::orchestrator::run_matching;
use ff_match::rules::{
    ExactPairRule, PartialManyToOneRule, PartialOneToManyRule, TolerancePairRule,
};

use crate::audit::{log_action, STATUS_SUCCESS};
use crate::evidence::{
    build_evidence_row, check_conflict, KIND_FINDING_EVIDENCE, KIND_LEAKAGE_EVIDENCE,
};
use crate::fx_service::load_fx_artifact_for_dataset;
use crate::limits::limits_from_parameters;
use crate::state::{EngineState, EvidenceRow, FindingRow, LeakageItemRow, RunRow, RunWrites};
use crate::workflow::ensure_default_review_state;
use crate::{EngineConfig, EngineError, ENGINE_ID, ENGINE_VERSION};

/// Run request as received from the transport layer.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
    pub dataset_version_id: Option<String>,
    pub fx_artifact_id: Option<String>,
    pub started_at: Option<String>,
    pub parameters: serde_json::Map<String, Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FindingOut {
    pub finding_id: String,
    pub dataset_version_id: String,
    pub fx_artifact_id: String,
    pub rule_id: String,
    pub rule_version: String,
    pub framework_version: String,
    pub finding_type: String,
    pub confidence: String,
    pub matched_record_ids: Vec<String>,
    pub unmatched_amount: Option<String>,
    pub primary_evidence_id: String,
    pub evidence_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConversionOut {
    pub record_id: String,
    pub currency_original: String,
    pub amount_original: String,
    pub base_currency: String,
    pub amount_converted: String,
    pub fx_rate_used: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportSectionStatus {
    pub status: String,
    pub fx_artifact_id: String,
    pub converted_records: usize,
    pub finding_count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub dataset_version_id: String,
    pub engine_id: String,
    pub engine_version: String,
    pub findings: Vec<FindingOut>,
    pub conversions: Vec<ConversionOut>,
    pub report_sections: BTreeMap<String, ReportSectionStatus>,
}

/// Execute one run end-to-end.
pub fn run_engine(
    state: &mut EngineState,
    store: &dyn ArtifactStore,
    config: &EngineConfig,
    request: &RunRequest,
) -> Result<RunSummary, EngineError> {
    // Kill switch first: disabled engines reject before touching state.
    if !config.is_engine_enabled(ENGINE_ID) {
        return Err(EngineError::EngineDisabled(ENGINE_ID.to_string()));
    }

    let dataset_version_id = validate_dataset_version_id(request.dataset_version_id.as_deref())?;
    let fx_artifact_id = validate_fx_artifact_id(request.fx_artifact_id.as_deref())?;
    let started_at = validate_started_at(request.started_at.as_deref())?;

    if !state.dataset_exists(&dataset_version_id) {
        return Err(EngineError::DatasetVersionNotFound(
            dataset_version_id.to_string(),
        ));
    }
    let (fx_row, fx_payload) =
        load_fx_artifact_for_dataset(state, store, &fx_artifact_id, &dataset_version_id)?;

    let parameters = &request.parameters;
    let rounding = rounding_from_parameters(parameters)?;
    let tolerance_amount = opt_decimal_param(parameters, "tolerance_amount")?;
    let tolerance_percent = opt_decimal_param(parameters, "tolerance_percent")?;
    let max_posted_days_diff = opt_int_param(parameters, "max_posted_days_diff")?;
    let timing_threshold = opt_int_param(parameters, "timing_inconsistency_days_threshold")?;
    let limits = limits_from_parameters(parameters)?;

    let parameters_value = Value::Object(parameters.clone());
    // The run identity covers the FX artifact next to the parameter map: two
    // requests differing only in rates must be two runs.
    let identity = serde_json::json!({
        "fx_artifact_id": fx_artifact_id.as_str(),
        "parameters": parameters_value.clone(),
    });
    let parameters_sha256 = sha256_hex(&to_canonical_json_bytes(&identity));
    let run_id = RunId::derive(
        &dataset_version_id,
        ENGINE_ID,
        ENGINE_VERSION,
        &parameters_sha256,
    )?;
    let span = tracing::info_span!("engine_run", run_id = %run_id, dataset_version_id = %dataset_version_id);
    let _guard = span.enter();

    // Canonical records, sorted by record_id, under the runtime cap.
    let canonical = state.canonical_for_dataset(&dataset_version_id);
    if canonical.len() > limits.max_canonical_records {
        return Err(EngineError::RuntimeLimitExceeded("max_canonical_records"));
    }

    let base_currency = fx_payload.base_currency.clone();
    let mut conversions = Vec::with_capacity(canonical.len());
    let mut inputs = Vec::with_capacity(canonical.len());
    for record in &canonical {
        let converted = convert_amount(
            record.amount_original,
            &record.currency_original,
            &base_currency,
            &fx_payload.rates,
            &rounding,
        )?;
        conversions.push(ConversionOut {
            record_id: record.record_id.to_string(),
            currency_original: record.currency_original.as_str().to_string(),
            amount_original: format_plain(&record.amount_original),
            base_currency: base_currency.clone(),
            amount_converted: format_plain(&converted.amount_converted),
            fx_rate_used: format_plain(&converted.fx_rate_used),
        });
        let mut reference_ids = record.reference_ids.clone();
        reference_ids.sort();
        inputs.push(CanonicalInput {
            record_id: record.record_id.clone(),
            record_type: record.record_type,
            source_system: record.source_system.clone(),
            source_record_id: record.source_record_id.clone(),
            posted_at: record.posted_at,
            counterparty_id: record.counterparty_id.clone(),
            amount_original: record.amount_original,
            currency_original: record.currency_original.clone(),
            direction: record.direction,
            reference_ids,
            converted: ConvertedAmounts {
                base_currency: base_currency.clone(),
                amount_converted: converted.amount_converted,
                fx_rate_used: converted.fx_rate_used,
            },
        });
    }

    let context = RuleContext {
        dataset_version_id: dataset_version_id.clone(),
        fx_artifact_id: fx_artifact_id.clone(),
        started_at,
        parameters: RuleParameters {
            rounding: rounding.clone(),
            tolerance_amount,
            tolerance_percent,
            max_posted_days_diff,
        },
    };

    // Fixed rule order; tolerance rules only when a tolerance is provided.
    let mut rules: Vec<Box<dyn MatchingRule>> = vec![
        Box::new(ExactPairRule::invoice_payment()),
        Box::new(ExactPairRule::invoice_credit_note()),
    ];
    if context.parameters.has_tolerance() {
        rules.push(Box::new(TolerancePairRule::invoice_payment()));
        rules.push(Box::new(TolerancePairRule::invoice_credit_note()));
    }
    rules.push(Box::new(PartialManyToOneRule));
    rules.push(Box::new(PartialOneToManyRule));

    let (outcomes, logs) = run_matching(&context, &inputs, &rules)?;
    for log in &logs {
        tracing::debug!(
            rule_id = log.rule_id,
            emitted = log.outcomes_emitted,
            applied = log.outcomes_applied,
            "rule telemetry"
        );
    }
    if outcomes.len() > limits.max_findings {
        return Err(EngineError::RuntimeLimitExceeded("max_findings"));
    }

    // Stage everything; nothing touches the registries until commit.
    let inputs_by_id: BTreeMap<&RecordId, &CanonicalInput> =
        inputs.iter().map(|i| (&i.record_id, i)).collect();

    let mut staged = Staging::default();
    for outcome in &outcomes {
        stage_outcome(
            state,
            &mut staged,
            outcome,
            &inputs_by_id,
            &context,
            &fx_row.checksum,
            started_at,
            &run_id,
            timing_threshold,
        )?;
    }

    staged
        .findings_out
        .sort_by(|a, b| (&a.rule_id, &a.finding_id).cmp(&(&b.rule_id, &b.finding_id)));
    staged
        .findings
        .sort_by(|a, b| (&a.rule_id, &a.finding_id).cmp(&(&b.rule_id, &b.finding_id)));

    let run_row = RunRow {
        run_id: run_id.clone(),
        dataset_version_id: dataset_version_id.clone(),
        fx_artifact_id: fx_artifact_id.clone(),
        started_at,
        status: "completed".to_string(),
        parameters: parameters_value,
        engine_version: ENGINE_VERSION.to_string(),
    };
    let finding_ids: Vec<FindingId> =
        staged.findings.iter().map(|f| f.finding_id.clone()).collect();
    let finding_count = staged.findings_out.len();
    state.commit_run(RunWrites {
        run: run_row,
        findings: staged.findings,
        leakage: staged.leakage,
        evidence: staged.evidence,
    })?;

    for finding_id in &finding_ids {
        ensure_default_review_state(state, &dataset_version_id, finding_id, started_at);
    }
    log_action(
        state,
        "system",
        "system",
        "engine_run",
        "run_completed",
        Some(&dataset_version_id),
        None,
        serde_json::json!({ "run_id": run_id.as_str(), "finding_count": finding_count }),
        STATUS_SUCCESS,
        None,
        &to_iso(&started_at),
    );

    let mut report_sections = BTreeMap::new();
    report_sections.insert(
        "financial_forensics".to_string(),
        ReportSectionStatus {
            status: "completed".to_string(),
            fx_artifact_id: fx_artifact_id.to_string(),
            converted_records: conversions.len(),
            finding_count,
        },
    );

    Ok(RunSummary {
        run_id: run_id.to_string(),
        dataset_version_id: dataset_version_id.to_string(),
        engine_id: ENGINE_ID.to_string(),
        engine_version: ENGINE_VERSION.to_string(),
        findings: staged.findings_out,
        conversions,
        report_sections,
    })
}

#[derive(Default)]
struct Staging {
    findings: Vec<FindingRow>,
    leakage: Vec<LeakageItemRow>,
    evidence: Vec<EvidenceRow>,
    findings_out: Vec<FindingOut>,
}

#[allow(clippy::too_many_arguments)]
fn stage_outcome(
    state: &EngineState,
    staged: &mut Staging,
    outcome: &MatchOutcome,
    inputs_by_id: &BTreeMap<&RecordId, &CanonicalInput>,
    context: &RuleContext,
    fx_checksum: &str,
    started_at: DateTime<FixedOffset>,
    run_id: &RunId,
    timing_threshold: Option<i64>,
) -> Result<(), EngineError> {
    let matched: Vec<&CanonicalInput> = outcome
        .matched_record_ids
        .iter()
        .map(|rid| {
            inputs_by_id.get(rid).copied().ok_or_else(|| {
                EngineError::InconsistentReference(format!(
                    "OUTCOME_RECORD_UNKNOWN: {rid}"
                ))
            })
        })
        .collect::<Result<_, _>>()?;
    let invoice = matched[0];

    let finding_id = FindingId::derive(
        &context.dataset_version_id,
        outcome.rule_id,
        outcome.rule_version,
        &outcome.matched_record_ids,
    )?;

    // Finding evidence bundle (schema v1, validated before staging).
    let schema = EvidenceSchemaV1::build(outcome, &matched, context);
    let evidence_row = build_evidence_row(
        &context.dataset_version_id,
        ENGINE_ID,
        KIND_FINDING_EVIDENCE,
        finding_id.as_str(),
        schema.to_payload(),
        started_at,
    )?;
    let evidence_id = evidence_row.evidence_id.clone();
    stage_evidence(state, staged, evidence_row)?;

    let finding_type = FindingType::from_confidence(outcome.confidence);
    let finding_row = FindingRow {
        finding_id: finding_id.clone(),
        run_id: run_id.clone(),
        dataset_version_id: context.dataset_version_id.clone(),
        fx_artifact_id: context.fx_artifact_id.clone(),
        rule_id: outcome.rule_id.to_string(),
        rule_version: outcome.rule_version.to_string(),
        framework_version: FRAMEWORK_VERSION.to_string(),
        finding_type,
        confidence: outcome.confidence,
        matched_record_ids: outcome.matched_record_ids.clone(),
        unmatched_amount: outcome.unmatched_amount,
        primary_evidence_id: evidence_id.clone(),
        evidence_ids: vec![evidence_id.clone()],
        created_at: started_at,
    };

    // Leakage classification + exposure, with its own evidence bundle.
    let leakage_inputs = LeakageInputs {
        finding_type,
        confidence: outcome.confidence,
        invoice_direction: invoice.direction,
        unmatched_amount: outcome.unmatched_amount,
        evidence: &schema,
        timing_inconsistency_days_threshold: timing_threshold,
    };
    let classification = classify_finding(&leakage_inputs);
    let exposure = derive_exposure(&leakage_inputs);
    let leakage_item_id = LeakageItemId::derive(run_id, &finding_id)?;

    let leakage_schema = build_leakage_evidence(
        &classification,
        &exposure,
        &finding_row,
        invoice,
        &matched[1..],
        fx_checksum,
        context,
    );
    let leakage_evidence_row = build_evidence_row(
        &context.dataset_version_id,
        ENGINE_ID,
        KIND_LEAKAGE_EVIDENCE,
        &format!("{}:{}", run_id.as_str(), leakage_item_id.as_str()),
        leakage_schema.to_payload(),
        started_at,
    )?;
    stage_evidence(state, staged, leakage_evidence_row)?;

    staged.leakage.push(LeakageItemRow {
        leakage_item_id,
        run_id: run_id.clone(),
        finding_id: finding_id.clone(),
        dataset_version_id: context.dataset_version_id.clone(),
        typology: classification.typology,
        exposure_abs: exposure.exposure_abs,
        exposure_signed: exposure.exposure_signed,
        created_at: started_at,
    });

    staged.findings_out.push(FindingOut {
        finding_id: finding_id.to_string(),
        dataset_version_id: context.dataset_version_id.to_string(),
        fx_artifact_id: context.fx_artifact_id.to_string(),
        rule_id: finding_row.rule_id.clone(),
        rule_version: finding_row.rule_version.clone(),
        framework_version: finding_row.framework_version.clone(),
        finding_type: finding_type.as_str().to_string(),
        confidence: outcome.confidence.as_str().to_string(),
        matched_record_ids: outcome
            .matched_record_ids
            .iter()
            .map(|r| r.to_string())
            .collect(),
        unmatched_amount: outcome.unmatched_amount.map(|d| format_plain(&d)),
        primary_evidence_id: evidence_id.to_string(),
        evidence_ids: vec![evidence_id.to_string()],
    });
    staged.findings.push(finding_row);
    Ok(())
}

/// Check conflicts against both committed and already-staged rows.
fn stage_evidence(
    state: &EngineState,
    staged: &mut Staging,
    row: EvidenceRow,
) -> Result<(), EngineError> {
    let existing = state.evidence(&row.evidence_id).or_else(|| {
        staged
            .evidence
            .iter()
            .find(|e| e.evidence_id == row.evidence_id)
    });
    match check_conflict(existing, &row).map_err(EngineError::Evidence)? {
        crate::evidence::EvidenceDisposition::Insert => staged.evidence.push(row),
        crate::evidence::EvidenceDisposition::AlreadyPresent => {}
    }
    Ok(())
}

fn build_leakage_evidence(
    classification: &Classification,
    exposure: &Exposure,
    finding: &FindingRow,
    invoice: &CanonicalInput,
    counterparts: &[&CanonicalInput],
    fx_checksum: &str,
    context: &RuleContext,
) -> LeakageEvidenceSchemaV1 {
    LeakageEvidenceSchemaV1 {
        typology_assignment: TypologyAssignmentEvidence {
            leakage_type: classification.typology.as_str().to_string(),
            assignment_rule_id: classification.assignment_rule_id.to_string(),
            assignment_rule_version: classification.assignment_rule_version.to_string(),
            assignment_criteria: classification.assignment_criteria.clone(),
            assignment_confidence: classification.assignment_confidence.to_string(),
            direction_convention: "debit_positive_credit_negative".to_string(),
            direction_source: "canonical_record.direction".to_string(),
        },
        exposure_derivation: ExposureDerivationEvidence {
            exposure_amount: exposure.exposure_abs,
            exposure_signed: exposure.exposure_signed,
            exposure_currency: invoice.converted.base_currency.clone(),
            exposure_basis: "converted_comparison".to_string(),
            exposure_currency_mode: exposure.currency_mode.to_string(),
            fx_artifact_id: context.fx_artifact_id.to_string(),
            fx_artifact_sha256: fx_checksum.to_string(),
            rounding_mode: context.parameters.rounding.mode.as_str().to_string(),
            base_currency: invoice.converted.base_currency.clone(),
            derivation_method: exposure.derivation_method.to_string(),
            derivation_inputs: exposure
                .derivation_inputs
                .iter()
                .map(|s| s.to_string())
                .collect(),
            derivation_confidence: exposure.derivation_confidence.to_string(),
        },
        finding_references: FindingReferencesEvidence {
            related_finding_ids: vec![finding.finding_id.to_string()],
            finding_rule_ids: vec![finding.rule_id.clone()],
            finding_rule_versions: vec![finding.rule_version.clone()],
            finding_confidences: vec![finding.confidence.as_str().to_string()],
            finding_evidence_ids: vec![finding.primary_evidence_id.to_string()],
            match_outcome: finding.finding_type.as_str().to_string(),
            match_search_scope: "dataset_version".to_string(),
        },
        primary_records: PrimaryRecordsEvidence {
            invoice_record_id: invoice.record_id.to_string(),
            invoice_source_system: invoice.source_system.clone(),
            invoice_source_record_id: invoice.source_record_id.clone(),
            invoice_canonical_record_id: invoice.record_id.to_string(),
            counterpart_record_ids: counterparts
                .iter()
                .map(|c| c.record_id.to_string())
                .collect(),
            counterpart_source_systems: counterparts
                .iter()
                .map(|c| c.source_system.clone())
                .collect(),
            counterpart_source_record_ids: counterparts
                .iter()
                .map(|c| c.source_record_id.clone())
                .collect(),
            counterpart_canonical_record_ids: counterparts
                .iter()
                .map(|c| c.record_id.to_string())
                .collect(),
            is_intercompany: false,
            intercompany_counterparty_ids: Vec::new(),
            intercompany_detection_method: "not_evaluated".to_string(),
        },
    }
}

// --------------------------------------------------------- input parsing ----

fn validate_dataset_version_id(raw: Option<&str>) -> Result<DatasetVersionId, EngineError> {
    let raw = raw.ok_or(EngineError::DatasetVersionMissing)?;
    if raw.trim().is_empty() {
        return Err(EngineError::DatasetVersionMissing);
    }
    raw.trim()
        .parse()
        .map_err(|_| EngineError::DatasetVersionInvalid(raw.to_string()))
}

fn validate_fx_artifact_id(raw: Option<&str>) -> Result<FxArtifactId, EngineError> {
    let raw = raw.ok_or(EngineError::FxArtifactMissing)?;
    if raw.trim().is_empty() {
        return Err(EngineError::FxArtifactMissing);
    }
    raw.trim()
        .parse()
        .map_err(|_| EngineError::FxArtifactInvalid(raw.to_string()))
}

fn validate_started_at(raw: Option<&str>) -> Result<DateTime<FixedOffset>, EngineError> {
    let raw = raw.ok_or(EngineError::StartedAtMissing)?;
    if raw.trim().is_empty() {
        return Err(EngineError::StartedAtMissing);
    }
    parse_offset_datetime(raw).map_err(|e| EngineError::StartedAtInvalid(e.to_string()))
}

fn rounding_from_parameters(
    parameters: &serde_json::Map<String, Value>,
) -> Result<RoundingSpec, EngineError> {
    let mode = match parameters.get("rounding_mode") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        _ => return Err(EngineError::RoundingModeRequired),
    };
    let quantum = match parameters.get("rounding_quantum") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        _ => return Err(EngineError::RoundingQuantumRequired),
    };
    RoundingSpec::parse(&mode, &quantum).map_err(|e| EngineError::ParameterInvalid(e.to_string()))
}

fn opt_decimal_param(
    parameters: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<Decimal>, EngineError> {
    let value = match parameters.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err(EngineError::ParameterInvalid(key.to_string())),
    };
    raw.parse::<Decimal>()
        .map(Some)
        .map_err(|_| EngineError::ParameterInvalid(key.to_string()))
}

fn opt_int_param(
    parameters: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<i64>, EngineError> {
    let value = match parameters.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .filter(|n| *n >= 0)
        .map(Some)
        .ok_or_else(|| EngineError::ParameterInvalid(key.to_string()))
}
