//! Normalization driver.
//!
//! Iterates a dataset's raw rows in `(ingested_at, raw_record_id)` order,
//! projects each through the pure normalizer, and appends the canonical rows.
//! Idempotent: an already-normalized record id is skipped.

use ff_core::DatasetVersionId;
use ff_match::normalize_record;

use crate::state::EngineState;
use crate::EngineError;

/// Normalize every raw record of the dataset. Returns the created count.
pub fn normalize_dataset(
    state: &mut EngineState,
    dataset_version_id: &DatasetVersionId,
) -> Result<usize, EngineError> {
    if !state.dataset_exists(dataset_version_id) {
        return Err(EngineError::DatasetVersionNotFound(
            dataset_version_id.to_string(),
        ));
    }

    // Normalize first, then insert: one bad row rejects the whole pass.
    let mut canonical = Vec::new();
    for raw in state.raw_records_for_dataset(dataset_version_id) {
        canonical.push(normalize_record(
            &raw.payload,
            dataset_version_id,
            raw.ingested_at,
        )?);
    }

    let mut created = 0usize;
    for record in canonical {
        if state.canonical_exists(&record.record_id) {
            continue;
        }
        state.insert_canonical_record(record);
        created += 1;
    }
    tracing::info!(
        dataset_version_id = %dataset_version_id,
        created,
        "normalized dataset"
    );
    Ok(created)
}
