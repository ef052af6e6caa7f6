//! FX artifact service.
//!
//! Canonicalizes the rate bundle, stores the bytes content-addressed, and
//! keeps the metadata row. Create is idempotent on (dataset_version_id,
//! checksum); load re-reads the bytes, verifies the checksum, and validates
//! the payload shape before parsing.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use ff_core::{DatasetVersionId, FxArtifactId};
use ff_io::fx::{canonical_fx_payload, fx_artifact_key, parse_fx_payload, FxPayload};
use ff_io::hasher::verify_sha256;
use ff_io::store::ArtifactStore;

use crate::state::{EngineState, FxArtifactRow};
use crate::EngineError;

/// Create (or idempotently return) an FX artifact for a dataset.
pub fn create_fx_artifact(
    state: &mut EngineState,
    store: &dyn ArtifactStore,
    dataset_version_id: &DatasetVersionId,
    base_currency: &str,
    effective_date: &str,
    rates: &serde_json::Map<String, Value>,
    created_at: DateTime<FixedOffset>,
) -> Result<FxArtifactRow, EngineError> {
    if !state.dataset_exists(dataset_version_id) {
        return Err(EngineError::DatasetVersionNotFound(
            dataset_version_id.to_string(),
        ));
    }

    let canonical = canonical_fx_payload(base_currency, effective_date, rates)?;

    if let Some(existing) = state.fx_artifact_by_checksum(dataset_version_id, &canonical.checksum)
    {
        return Ok(existing.clone());
    }

    let key = fx_artifact_key(dataset_version_id, &canonical.checksum);
    let stored = store.put(&key, &canonical.bytes, "application/json")?;
    debug_assert_eq!(stored.sha256, canonical.checksum);

    let row = FxArtifactRow {
        fx_artifact_id: FxArtifactId::derive(dataset_version_id, &canonical.checksum)?,
        dataset_version_id: dataset_version_id.clone(),
        base_currency: canonical.payload.base_currency.clone(),
        effective_date: canonical.payload.effective_date.clone(),
        checksum: canonical.checksum.clone(),
        artifact_uri: stored.uri,
        created_at,
    };
    state.insert_fx_artifact(row.clone());
    tracing::info!(
        fx_artifact_id = %row.fx_artifact_id,
        checksum = %row.checksum,
        "fx artifact stored"
    );
    Ok(row)
}

/// Load an FX artifact's payload, verifying content identity on read.
pub fn load_fx_artifact(
    state: &EngineState,
    store: &dyn ArtifactStore,
    fx_artifact_id: &FxArtifactId,
) -> Result<(FxArtifactRow, FxPayload), EngineError> {
    let row = state
        .fx_artifact(fx_artifact_id)
        .cloned()
        .ok_or_else(|| EngineError::FxArtifactNotFound(fx_artifact_id.to_string()))?;

    let key = store.key_from_uri(&row.artifact_uri)?;
    let bytes = store.get(&key)?;
    verify_sha256(&bytes, &row.checksum)?;
    let payload = parse_fx_payload(&bytes)?;
    Ok((row, payload))
}

/// Load scoped to a dataset; a cross-dataset reference is inconsistent.
pub fn load_fx_artifact_for_dataset(
    state: &EngineState,
    store: &dyn ArtifactStore,
    fx_artifact_id: &FxArtifactId,
    dataset_version_id: &DatasetVersionId,
) -> Result<(FxArtifactRow, FxPayload), EngineError> {
    let (row, payload) = load_fx_artifact(state, store, fx_artifact_id)?;
    if &row.dataset_version_id != dataset_version_id {
        return Err(EngineError::InconsistentReference(
            "FX_ARTIFACT_DATASET_MISMATCH".to_string(),
        ));
    }
    Ok((row, payload))
}
