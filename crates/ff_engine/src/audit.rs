//! Append-only audit log.
//!
//! Workflow transitions, lifecycle violations, and run/report completion all
//! leave a record. Audit ids are deterministic over the record's position so
//! replays of identical histories converge.

use serde::Serialize;
use serde_json::Value;

use ff_core::ids::{deterministic_id, NAMESPACE_LINK};
use ff_core::DatasetVersionId;

use crate::state::EngineState;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditRecord {
    pub audit_id: String,
    pub actor_id: String,
    pub actor_type: String,
    pub action_type: String,
    pub action_label: String,
    pub dataset_version_id: Option<String>,
    pub reason: Option<String>,
    pub context: Value,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: String,
}

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILURE: &str = "failure";

#[allow(clippy::too_many_arguments)]
pub fn log_action(
    state: &mut EngineState,
    actor_id: &str,
    actor_type: &str,
    action_type: &str,
    action_label: &str,
    dataset_version_id: Option<&DatasetVersionId>,
    reason: Option<String>,
    context: Value,
    status: &str,
    error_message: Option<String>,
    created_at: &str,
) {
    let seq = state.audit_log().len();
    let audit_id = deterministic_id(
        &NAMESPACE_LINK,
        &[
            "audit",
            dataset_version_id.map(|d| d.as_str()).unwrap_or("none"),
            action_type,
            action_label,
            &seq.to_string(),
        ],
    )
    .expect("audit id parts carry no separator");
    state.push_audit(AuditRecord {
        audit_id,
        actor_id: actor_id.to_string(),
        actor_type: actor_type.to_string(),
        action_type: action_type.to_string(),
        action_label: action_label.to_string(),
        dataset_version_id: dataset_version_id.map(|d| d.to_string()),
        reason,
        context,
        status: status.to_string(),
        error_message,
        created_at: created_at.to_string(),
    });
}
