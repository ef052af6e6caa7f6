//! ff_io — canonical JSON, hashing, and immutable artifact storage.
//!
//! Single source of truth for every byte the engine persists:
//! - Canonical JSON: sorted keys, compact separators, UTF-8, no trailing newline
//! - SHA-256 over canonical bytes (lowercase 64-hex across OS/arch)
//! - Content-addressed artifact store (memory + filesystem back-ends) that
//!   refuses overwrites and verifies checksums on read
//! - FX artifact payload canonicalization + schema validation

#![forbid(unsafe_code)]

use thiserror::Error;

pub mod canonical_json;
pub mod fx;
pub mod hasher;
pub mod store;

/// Unified error for ff_io (canonical_json/hasher/store).
#[derive(Debug, Error)]
pub enum IoError {
    /// Filesystem / path errors (create_dir_all, rename, fsync, etc.)
    #[error("io/path error: {0}")]
    Path(String),

    /// JSON serialization/deserialization errors.
    #[error("json error: {0}")]
    Json(String),

    /// Hashing-related errors.
    #[error("hash error: {0}")]
    Hash(String),

    #[error("ARTIFACT_NOT_FOUND: {0}")]
    ArtifactNotFound(String),

    /// A different payload already exists at the key; artifacts are immutable.
    #[error("ARTIFACT_OVERWRITE_FORBIDDEN: {0}")]
    ArtifactOverwriteForbidden(String),

    #[error("ARTIFACT_CHECKSUM_MISMATCH: expected {expected}, got {actual}")]
    ArtifactChecksumMismatch { expected: String, actual: String },

    #[error("ARTIFACT_URI_INVALID: {0}")]
    UriInvalid(String),

    /// Generic validation / invariants.
    #[error("invalid: {0}")]
    Invalid(String),
}

pub type IoResult<T> = Result<T, IoError>;

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Path(e.to_string())
    }
}

impl From<serde_json::Error> for IoError {
    fn from(e: serde_json::Error) -> Self {
        IoError::Json(e.to_string())
    }
}
