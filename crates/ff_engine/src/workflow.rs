//! Workflow + lifecycle state machines.
//!
//! States: draft → review → approved → locked, with review ↔ draft. All other
//! transitions are rejected. review→approved and approved→locked require
//! evidence bound to the subject and an actor holding the administrative
//! capability. Every transition appends an immutable transition row with the
//! derived prerequisite flags and writes an audit record.
//!
//! Lifecycle stages (import, normalize, calculate, report, audit) are
//! workflow subjects of type `lifecycle`; report and audit assembly require
//! the stage to be approved and log a failure audit record otherwise.

use thiserror::Error;

use chrono::{DateTime, FixedOffset};
use serde_json::json;

use ff_core::ids::{deterministic_id, NAMESPACE_LINK};
use ff_core::time::to_iso;
use ff_core::{DatasetVersionId, FindingId};

use crate::audit::{log_action, STATUS_FAILURE, STATUS_SUCCESS};
use crate::state::{EngineState, WorkflowStateRow, WorkflowTransitionRow};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("INVALID_STATE_TRANSITION: from '{from}' to '{to}'")]
    InvalidStateTransition { from: String, to: String },

    #[error("MISSING_PREREQUISITES: {0}")]
    MissingPrerequisites(String),

    #[error("LIFECYCLE_VIOLATION: {0}")]
    LifecycleViolation(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum WorkflowState {
    Draft,
    Review,
    Approved,
    Locked,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Review => "review",
            Self::Approved => "approved",
            Self::Locked => "locked",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(Self::Draft),
            "review" => Some(Self::Review),
            "approved" => Some(Self::Approved),
            "locked" => Some(Self::Locked),
            _ => None,
        }
    }

    fn valid_targets(&self) -> &'static [WorkflowState] {
        match self {
            Self::Draft => &[WorkflowState::Review],
            Self::Review => &[WorkflowState::Draft, WorkflowState::Approved],
            Self::Approved => &[WorkflowState::Locked],
            Self::Locked => &[],
        }
    }

    fn requires_prerequisites(&self, to: WorkflowState) -> bool {
        matches!(
            (self, to),
            (Self::Review, WorkflowState::Approved) | (Self::Approved, WorkflowState::Locked)
        )
    }
}

/// Subject types.
pub const SUBJECT_FINDING: &str = "finding";
pub const SUBJECT_LIFECYCLE: &str = "lifecycle";

/// Lifecycle stage identifiers (the subject_id of `lifecycle` subjects).
pub const STAGE_IMPORT: &str = "import";
pub const STAGE_NORMALIZE: &str = "normalize";
pub const STAGE_CALCULATE: &str = "calculate";
pub const STAGE_REPORT: &str = "report";
pub const STAGE_AUDIT: &str = "audit";

/// Authenticated principal, as derived by the (out-of-scope) auth layer.
#[derive(Clone, Debug)]
pub struct Actor {
    pub actor_id: String,
    /// Administrative capability; required to approve or lock.
    pub is_admin: bool,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            actor_id: "system".to_string(),
            is_admin: false,
        }
    }
}

/// Evidence bound to a subject, derived from the registries.
fn has_evidence_for_subject(
    state: &EngineState,
    dataset_version_id: &DatasetVersionId,
    subject_type: &str,
    subject_id: &str,
) -> bool {
    match subject_type {
        SUBJECT_FINDING => subject_id
            .parse::<FindingId>()
            .ok()
            .and_then(|fid| state.finding(&fid))
            .map(|f| !f.evidence_ids.is_empty())
            .unwrap_or(false),
        SUBJECT_LIFECYCLE => match subject_id {
            STAGE_IMPORT => !state.raw_records_for_dataset(dataset_version_id).is_empty(),
            STAGE_NORMALIZE => !state.canonical_for_dataset(dataset_version_id).is_empty(),
            STAGE_CALCULATE => state.any_run_for_dataset(dataset_version_id),
            STAGE_REPORT => state.any_run_with_findings(dataset_version_id),
            STAGE_AUDIT => stage_is_approved(state, dataset_version_id, STAGE_REPORT),
            _ => false,
        },
        _ => false,
    }
}

fn transition_id_for(
    state: &EngineState,
    dataset_version_id: &DatasetVersionId,
    subject_type: &str,
    subject_id: &str,
) -> String {
    let seq = state
        .workflow_transitions_for_subject(dataset_version_id, subject_type, subject_id)
        .len();
    deterministic_id(
        &NAMESPACE_LINK,
        &[
            "workflow_transition",
            dataset_version_id.as_str(),
            subject_type,
            subject_id,
            &seq.to_string(),
        ],
    )
    .expect("transition id parts carry no separator")
}

/// Create the initial state for a subject (idempotent).
pub fn create_workflow_state(
    state: &mut EngineState,
    dataset_version_id: &DatasetVersionId,
    subject_type: &str,
    subject_id: &str,
    initial_state: WorkflowState,
    actor: &Actor,
    at: DateTime<FixedOffset>,
) -> WorkflowState {
    if let Some(existing) = state.workflow_state(dataset_version_id, subject_type, subject_id) {
        return existing.current_state;
    }

    let workflow_state_id = deterministic_id(
        &NAMESPACE_LINK,
        &[
            "workflow_state",
            dataset_version_id.as_str(),
            subject_type,
            subject_id,
        ],
    )
    .expect("workflow state id parts carry no separator");

    let transition_id = transition_id_for(state, dataset_version_id, subject_type, subject_id);
    state.put_workflow_state(WorkflowStateRow {
        workflow_state_id,
        dataset_version_id: dataset_version_id.clone(),
        subject_type: subject_type.to_string(),
        subject_id: subject_id.to_string(),
        current_state: initial_state,
        created_at: at,
        updated_at: at,
        created_by: Some(actor.actor_id.clone()),
        updated_by: None,
    });
    state.push_workflow_transition(WorkflowTransitionRow {
        transition_id,
        dataset_version_id: dataset_version_id.to_string(),
        subject_type: subject_type.to_string(),
        subject_id: subject_id.to_string(),
        from_state: "none".to_string(),
        to_state: initial_state.as_str().to_string(),
        actor_id: Some(actor.actor_id.clone()),
        reason: Some("initial_state".to_string()),
        has_evidence: false,
        has_approval: false,
        created_at: to_iso(&at),
    });
    initial_state
}

/// Transition a subject with validation, prerequisite checks, and logging.
pub fn transition_workflow_state(
    state: &mut EngineState,
    dataset_version_id: &DatasetVersionId,
    subject_type: &str,
    subject_id: &str,
    to_state: WorkflowState,
    actor: &Actor,
    reason: Option<&str>,
    at: DateTime<FixedOffset>,
) -> Result<WorkflowState, WorkflowError> {
    let from_state = match state.workflow_state(dataset_version_id, subject_type, subject_id) {
        Some(row) => row.current_state,
        None => create_workflow_state(
            state,
            dataset_version_id,
            subject_type,
            subject_id,
            WorkflowState::Draft,
            actor,
            at,
        ),
    };

    if from_state == to_state {
        return Ok(from_state);
    }
    if !from_state.valid_targets().contains(&to_state) {
        return Err(WorkflowError::InvalidStateTransition {
            from: from_state.as_str().to_string(),
            to: to_state.as_str().to_string(),
        });
    }

    let has_evidence =
        has_evidence_for_subject(state, dataset_version_id, subject_type, subject_id);
    let has_approval = actor.is_admin;
    if from_state.requires_prerequisites(to_state) {
        if !has_evidence {
            return Err(WorkflowError::MissingPrerequisites(format!(
                "transition '{}' -> '{}' requires evidence bound to the subject",
                from_state.as_str(),
                to_state.as_str()
            )));
        }
        if !has_approval {
            return Err(WorkflowError::MissingPrerequisites(format!(
                "transition '{}' -> '{}' requires an administrative approval",
                from_state.as_str(),
                to_state.as_str()
            )));
        }
    }

    let transition_id = transition_id_for(state, dataset_version_id, subject_type, subject_id);
    let mut row = state
        .workflow_state(dataset_version_id, subject_type, subject_id)
        .expect("state created above")
        .clone();
    row.current_state = to_state;
    row.updated_at = at;
    row.updated_by = Some(actor.actor_id.clone());
    state.put_workflow_state(row);

    state.push_workflow_transition(WorkflowTransitionRow {
        transition_id,
        dataset_version_id: dataset_version_id.to_string(),
        subject_type: subject_type.to_string(),
        subject_id: subject_id.to_string(),
        from_state: from_state.as_str().to_string(),
        to_state: to_state.as_str().to_string(),
        actor_id: Some(actor.actor_id.clone()),
        reason: reason.map(|r| r.to_string()),
        has_evidence,
        has_approval,
        created_at: to_iso(&at),
    });
    log_action(
        state,
        &actor.actor_id,
        "user",
        "workflow",
        "state_transition",
        Some(dataset_version_id),
        reason.map(|r| r.to_string()),
        json!({
            "subject_type": subject_type,
            "subject_id": subject_id,
            "from_state": from_state.as_str(),
            "to_state": to_state.as_str(),
            "has_evidence": has_evidence,
            "has_approval": has_approval,
        }),
        STATUS_SUCCESS,
        None,
        &to_iso(&at),
    );

    Ok(to_state)
}

/// Findings land in review by default: none → draft → review, idempotent.
pub fn ensure_default_review_state(
    state: &mut EngineState,
    dataset_version_id: &DatasetVersionId,
    finding_id: &FindingId,
    at: DateTime<FixedOffset>,
) {
    let actor = Actor::system();
    let current = create_workflow_state(
        state,
        dataset_version_id,
        SUBJECT_FINDING,
        finding_id.as_str(),
        WorkflowState::Draft,
        &actor,
        at,
    );
    if current == WorkflowState::Draft {
        // draft → review carries no prerequisites; this cannot fail.
        let _ = transition_workflow_state(
            state,
            dataset_version_id,
            SUBJECT_FINDING,
            finding_id.as_str(),
            WorkflowState::Review,
            &actor,
            Some("default_review_state"),
            at,
        );
    }
}

pub fn stage_is_approved(
    state: &EngineState,
    dataset_version_id: &DatasetVersionId,
    stage: &str,
) -> bool {
    state
        .workflow_state(dataset_version_id, SUBJECT_LIFECYCLE, stage)
        .map(|row| row.current_state == WorkflowState::Approved)
        .unwrap_or(false)
}

/// Gate for report/audit reads. On violation, a failure audit record is
/// written before the error surfaces.
pub fn require_stage_approved(
    state: &mut EngineState,
    dataset_version_id: &DatasetVersionId,
    stage: &str,
    attempted_action: &str,
    at: DateTime<FixedOffset>,
) -> Result<(), WorkflowError> {
    if stage_is_approved(state, dataset_version_id, stage) {
        return Ok(());
    }
    let message = format!(
        "stage '{stage}' is not approved for dataset {dataset_version_id}; {attempted_action} refused"
    );
    log_action(
        state,
        "system",
        "system",
        "integrity",
        "lifecycle_violation",
        Some(dataset_version_id),
        Some(message.clone()),
        json!({ "stage": stage, "attempted_action": attempted_action }),
        STATUS_FAILURE,
        Some(message.clone()),
        &to_iso(&at),
    );
    Err(WorkflowError::LifecycleViolation(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DatasetVersionRow, EngineState};
    use ff_core::time::parse_offset_datetime;

    fn dv() -> DatasetVersionId {
        "00000000-0000-7000-8000-000000000001".parse().unwrap()
    }

    fn state_with_dataset() -> EngineState {
        let mut state = EngineState::new();
        state.insert_dataset(DatasetVersionRow {
            id: dv(),
            created_at: parse_offset_datetime("2026-01-01T00:00:00Z").unwrap(),
        });
        state
    }

    fn at() -> DateTime<FixedOffset> {
        parse_offset_datetime("2026-01-02T00:00:00Z").unwrap()
    }

    #[test]
    fn draft_review_cycle_is_allowed() {
        let mut state = state_with_dataset();
        let admin = Actor {
            actor_id: "a1".into(),
            is_admin: true,
        };
        let dv = dv();
        transition_workflow_state(
            &mut state,
            &dv,
            SUBJECT_LIFECYCLE,
            STAGE_IMPORT,
            WorkflowState::Review,
            &admin,
            None,
            at(),
        )
        .unwrap();
        transition_workflow_state(
            &mut state,
            &dv,
            SUBJECT_LIFECYCLE,
            STAGE_IMPORT,
            WorkflowState::Draft,
            &admin,
            Some("rework"),
            at(),
        )
        .unwrap();
        assert_eq!(
            state
                .workflow_state(&dv, SUBJECT_LIFECYCLE, STAGE_IMPORT)
                .unwrap()
                .current_state,
            WorkflowState::Draft
        );
        // none→draft, draft→review, review→draft
        assert_eq!(
            state
                .workflow_transitions_for_subject(&dv, SUBJECT_LIFECYCLE, STAGE_IMPORT)
                .len(),
            3
        );
    }

    #[test]
    fn invalid_transitions_rejected() {
        let mut state = state_with_dataset();
        let admin = Actor {
            actor_id: "a1".into(),
            is_admin: true,
        };
        let err = transition_workflow_state(
            &mut state,
            &dv(),
            SUBJECT_LIFECYCLE,
            STAGE_IMPORT,
            WorkflowState::Locked,
            &admin,
            None,
            at(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStateTransition { .. }));
    }

    #[test]
    fn approval_needs_admin_and_evidence() {
        let mut state = state_with_dataset();
        let user = Actor {
            actor_id: "u1".into(),
            is_admin: false,
        };
        let dv = dv();
        transition_workflow_state(
            &mut state,
            &dv,
            SUBJECT_LIFECYCLE,
            STAGE_IMPORT,
            WorkflowState::Review,
            &user,
            None,
            at(),
        )
        .unwrap();
        // No raw records ingested → no evidence for the import stage.
        let err = transition_workflow_state(
            &mut state,
            &dv,
            SUBJECT_LIFECYCLE,
            STAGE_IMPORT,
            WorkflowState::Approved,
            &user,
            None,
            at(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::MissingPrerequisites(_)));
    }

    #[test]
    fn lifecycle_gate_logs_failure_audit_record() {
        let mut state = state_with_dataset();
        let err =
            require_stage_approved(&mut state, &dv(), STAGE_REPORT, "report_assembly", at())
                .unwrap_err();
        assert!(matches!(err, WorkflowError::LifecycleViolation(_)));
        let log = state.audit_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, STATUS_FAILURE);
        assert_eq!(log[0].action_type, "integrity");
    }
}
