//! Deterministic identifiers.
//!
//! Every durable id in the engine is derived by applying a fixed, pre-assigned
//! namespace UUID to a canonical key string: the input parts joined with the
//! reserved separator `|` and hashed with UUIDv5. Identical inputs always
//! yield the identical 36-char lowercase id; a part that contains the
//! separator is rejected rather than silently hashed.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CoreError;

/// Reserved join separator for canonical key strings.
pub const ID_SEPARATOR: char = '|';

/// Pre-assigned namespaces, one per entity kind.
pub const NAMESPACE_CANONICAL_RECORD: Uuid = Uuid::from_u128(0x41);
pub const NAMESPACE_RUN: Uuid = Uuid::from_u128(0x42);
pub const NAMESPACE_EVIDENCE: Uuid = Uuid::from_u128(0x43);
pub const NAMESPACE_LINK: Uuid = Uuid::from_u128(0x44);
pub const NAMESPACE_FINDING: Uuid = Uuid::from_u128(0x45);

/// Derive a deterministic 36-char id from `parts` under `namespace`.
pub fn deterministic_id(namespace: &Uuid, parts: &[&str]) -> Result<String, CoreError> {
    for part in parts {
        if part.contains(ID_SEPARATOR) {
            return Err(CoreError::IdPartContainsSeparator((*part).to_string()));
        }
    }
    let key = parts.join("|");
    Ok(Uuid::new_v5(namespace, key.as_bytes()).to_string())
}

fn is_uuid_like(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 36 {
        return false;
    }
    b.iter().enumerate().all(|(i, c)| match i {
        8 | 13 | 18 | 23 => *c == b'-',
        _ => matches!(c, b'0'..=b'9' | b'a'..=b'f'),
    })
}

macro_rules! def_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if is_uuid_like(s) {
                    Ok(Self(s.to_string()))
                } else {
                    Err(CoreError::InvalidId(s.to_string()))
                }
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u.to_string())
            }
        }
    };
}

def_id!(
    /// Root identifier of a dataset snapshot (time-ordered UUID, minted at ingestion).
    DatasetVersionId
);
def_id!(
    /// Identifier of one ingested raw row.
    RawRecordId
);
def_id!(
    /// Deterministic canonical record id (namespace: canonical record).
    RecordId
);
def_id!(
    /// Content-bound FX artifact id.
    FxArtifactId
);
def_id!(
    /// Deterministic run id (namespace: run).
    RunId
);
def_id!(
    /// Deterministic finding id (namespace: finding).
    FindingId
);
def_id!(
    /// Deterministic evidence id (namespace: evidence).
    EvidenceId
);
def_id!(
    /// Deterministic leakage item id (namespace: link, keyed by run and finding).
    LeakageItemId
);

impl RecordId {
    /// Canonical record id over (dataset_version_id, source_system, source_record_id).
    pub fn derive(
        dataset_version_id: &DatasetVersionId,
        source_system: &str,
        source_record_id: &str,
    ) -> Result<Self, CoreError> {
        let id = deterministic_id(
            &NAMESPACE_CANONICAL_RECORD,
            &[dataset_version_id.as_str(), source_system, source_record_id],
        )?;
        Ok(Self(id))
    }
}

impl FindingId {
    /// Finding id over (dataset_version_id, rule_id, rule_version, matched record ids).
    pub fn derive(
        dataset_version_id: &DatasetVersionId,
        rule_id: &str,
        rule_version: &str,
        matched_record_ids: &[RecordId],
    ) -> Result<Self, CoreError> {
        let mut parts: Vec<&str> = vec![dataset_version_id.as_str(), rule_id, rule_version];
        parts.extend(matched_record_ids.iter().map(|r| r.as_str()));
        Ok(Self(deterministic_id(&NAMESPACE_FINDING, &parts)?))
    }
}

impl EvidenceId {
    /// Evidence id over (dataset_version_id, engine_id, kind, stable_key).
    pub fn derive(
        dataset_version_id: &DatasetVersionId,
        engine_id: &str,
        kind: &str,
        stable_key: &str,
    ) -> Result<Self, CoreError> {
        let id = deterministic_id(
            &NAMESPACE_EVIDENCE,
            &[dataset_version_id.as_str(), engine_id, kind, stable_key],
        )?;
        Ok(Self(id))
    }
}

impl LeakageItemId {
    /// Leakage item id over (run_id, finding_id); unique per pair by construction.
    pub fn derive(run_id: &RunId, finding_id: &FindingId) -> Result<Self, CoreError> {
        let id = deterministic_id(
            &NAMESPACE_LINK,
            &["leakage_item", run_id.as_str(), finding_id.as_str()],
        )?;
        Ok(Self(id))
    }
}

impl RunId {
    /// Run id over (dataset_version_id, engine_id, engine_version, parameters hash).
    pub fn derive(
        dataset_version_id: &DatasetVersionId,
        engine_id: &str,
        engine_version: &str,
        parameters_sha256: &str,
    ) -> Result<Self, CoreError> {
        let id = deterministic_id(
            &NAMESPACE_RUN,
            &[
                dataset_version_id.as_str(),
                engine_id,
                engine_version,
                parameters_sha256,
            ],
        )?;
        Ok(Self(id))
    }
}

impl FxArtifactId {
    /// FX artifact id over (dataset_version_id, payload checksum).
    pub fn derive(
        dataset_version_id: &DatasetVersionId,
        checksum: &str,
    ) -> Result<Self, CoreError> {
        let id = deterministic_id(
            &NAMESPACE_LINK,
            &["fx_artifact", dataset_version_id.as_str(), checksum],
        )?;
        Ok(Self(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_identical_ids() {
        let a = deterministic_id(&NAMESPACE_FINDING, &["dv", "rule", "v1", "r1", "r2"]).unwrap();
        let b = deterministic_id(&NAMESPACE_FINDING, &["dv", "rule", "v1", "r1", "r2"]).unwrap();
        assert_eq!(a, b);
        assert!(is_uuid_like(&a));
    }

    #[test]
    fn distinct_namespaces_distinct_ids() {
        let a = deterministic_id(&NAMESPACE_FINDING, &["k"]).unwrap();
        let b = deterministic_id(&NAMESPACE_EVIDENCE, &["k"]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn separator_in_part_is_rejected() {
        let err = deterministic_id(&NAMESPACE_RUN, &["a|b"]).unwrap_err();
        assert!(matches!(err, CoreError::IdPartContainsSeparator(_)));
    }

    #[test]
    fn id_parse_rejects_uppercase_and_short() {
        assert!("A5ADF3BF-3C38-5B71-9A42-000000000000"
            .parse::<RecordId>()
            .is_err());
        assert!("abc".parse::<RecordId>().is_err());
        let ok = deterministic_id(&NAMESPACE_CANONICAL_RECORD, &["x"]).unwrap();
        assert!(ok.parse::<RecordId>().is_ok());
    }
}
