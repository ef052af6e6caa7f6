//! Content-addressed artifact store.
//!
//! Contract shared by all back-ends:
//! - `put` returns `{uri, sha256}` with `sha256 = SHA-256(bytes)`
//! - repeated `put` with identical bytes at the same key is idempotent
//! - `put` with different bytes at an existing key fails with an overwrite error
//! - reads are verified by the caller against an expected checksum
//!
//! The URI scheme identifies the backend (`memory://`, `file://`).

use std::collections::BTreeMap;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};

use crate::canonical_json::write_bytes_atomic;
use crate::hasher::sha256_hex;
use crate::IoError;

/// Result of a successful `put`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredArtifact {
    pub uri: String,
    pub sha256: String,
}

/// Immutable byte store keyed by stable paths.
pub trait ArtifactStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<StoredArtifact, IoError>;
    fn get(&self, key: &str) -> Result<Vec<u8>, IoError>;
    fn exists(&self, key: &str) -> Result<bool, IoError>;
    /// URI scheme this backend emits (`memory` or `file`).
    fn scheme(&self) -> &'static str;
    /// Resolve one of this backend's URIs back to its store key.
    fn key_from_uri(&self, uri: &str) -> Result<String, IoError>;
}

/// Extract the store key from a `memory://` URI.
pub fn memory_key_from_uri(uri: &str) -> Result<String, IoError> {
    let key = uri
        .strip_prefix("memory://")
        .ok_or_else(|| IoError::UriInvalid(uri.to_string()))?;
    if key.is_empty() {
        return Err(IoError::UriInvalid(uri.to_string()));
    }
    Ok(key.to_string())
}

fn check_key(key: &str) -> Result<(), IoError> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|seg| seg == "..") {
        return Err(IoError::Invalid(format!("artifact key invalid: {key}")));
    }
    Ok(())
}

// ---------------------------------------------------------------- memory ----

/// In-memory backend. Keys map to `(bytes, content_type)`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<StoredArtifact, IoError> {
        check_key(key)?;
        let sha256 = sha256_hex(bytes);
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        if let Some((existing, _)) = inner.get(key) {
            if existing.as_slice() != bytes {
                return Err(IoError::ArtifactOverwriteForbidden(key.to_string()));
            }
        } else {
            inner.insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        }
        Ok(StoredArtifact {
            uri: format!("memory://{key}"),
            sha256,
        })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, IoError> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        inner
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| IoError::ArtifactNotFound(key.to_string()))
    }

    fn exists(&self, key: &str) -> Result<bool, IoError> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner.contains_key(key))
    }

    fn scheme(&self) -> &'static str {
        "memory"
    }

    fn key_from_uri(&self, uri: &str) -> Result<String, IoError> {
        memory_key_from_uri(uri)
    }
}

// ------------------------------------------------------------ filesystem ----

/// Filesystem backend rooted at a UTF-8 directory. Writes are atomic so a
/// torn write can never verify against its checksum.
pub struct FsStore {
    root: Utf8PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Utf8PathBuf {
        self.root.join(key)
    }
}

impl ArtifactStore for FsStore {
    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<StoredArtifact, IoError> {
        check_key(key)?;
        let sha256 = sha256_hex(bytes);
        let path = self.path_for(key);
        if path.exists() {
            let existing = std::fs::read(path.as_std_path())?;
            if existing.as_slice() != bytes {
                return Err(IoError::ArtifactOverwriteForbidden(key.to_string()));
            }
        } else {
            write_bytes_atomic(path.as_std_path(), bytes)?;
        }
        Ok(StoredArtifact {
            uri: format!("file://{path}"),
            sha256,
        })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, IoError> {
        check_key(key)?;
        let path = self.path_for(key);
        if !path.exists() {
            return Err(IoError::ArtifactNotFound(key.to_string()));
        }
        Ok(std::fs::read(path.as_std_path())?)
    }

    fn exists(&self, key: &str) -> Result<bool, IoError> {
        check_key(key)?;
        Ok(self.path_for(key).exists())
    }

    fn scheme(&self) -> &'static str {
        "file"
    }

    /// `file://` URIs embed the store root; the key is the path below it.
    fn key_from_uri(&self, uri: &str) -> Result<String, IoError> {
        let path = uri
            .strip_prefix("file://")
            .ok_or_else(|| IoError::UriInvalid(uri.to_string()))?;
        Utf8Path::new(path)
            .strip_prefix(&self.root)
            .map(|rel| rel.to_string())
            .map_err(|_| IoError::UriInvalid(uri.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_contract(store: &dyn ArtifactStore) {
        let key = "core/fx/dv-1/abc.json";
        assert!(!store.exists(key).unwrap());

        let put1 = store.put(key, b"{\"a\":1}", "application/json").unwrap();
        assert_eq!(put1.sha256, sha256_hex(b"{\"a\":1}"));
        assert!(store.exists(key).unwrap());

        // Idempotent same-bytes put.
        let put2 = store.put(key, b"{\"a\":1}", "application/json").unwrap();
        assert_eq!(put1, put2);

        // Different bytes at the same key must fail.
        let err = store.put(key, b"{\"a\":2}", "application/json").unwrap_err();
        assert!(matches!(err, IoError::ArtifactOverwriteForbidden(_)));

        // Read path returns the original bytes.
        assert_eq!(store.get(key).unwrap(), b"{\"a\":1}");
        assert!(matches!(
            store.get("missing/key").unwrap_err(),
            IoError::ArtifactNotFound(_)
        ));
    }

    #[test]
    fn memory_store_contract() {
        exercise_contract(&MemoryStore::new());
    }

    #[test]
    fn fs_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        exercise_contract(&FsStore::new(root));
    }

    #[test]
    fn tampering_on_disk_is_detectable_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let store = FsStore::new(root.clone());
        let put = store.put("blob.json", b"{\"r\":\"1\"}", "application/json").unwrap();

        // Flip one byte behind the store's back.
        let path = root.join("blob.json");
        let mut bytes = std::fs::read(path.as_std_path()).unwrap();
        bytes[1] ^= 1;
        std::fs::write(path.as_std_path(), &bytes).unwrap();

        let reread = store.get("blob.json").unwrap();
        assert!(crate::hasher::verify_sha256(&reread, &put.sha256).is_err());
    }

    #[test]
    fn uri_key_round_trip_per_backend() {
        let memory = MemoryStore::new();
        let put = memory.put("core/fx/x.json", b"{}", "application/json").unwrap();
        assert_eq!(memory.key_from_uri(&put.uri).unwrap(), "core/fx/x.json");
        assert!(memory.key_from_uri("s3://bucket/key").is_err());
        assert!(memory.key_from_uri("garbage").is_err());

        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let fs = FsStore::new(root);
        let put = fs.put("core/fx/x.json", b"{}", "application/json").unwrap();
        assert_eq!(fs.key_from_uri(&put.uri).unwrap(), "core/fx/x.json");
        assert!(fs.key_from_uri("file:///somewhere/else.json").is_err());
    }

    #[test]
    fn rejects_traversal_keys() {
        let store = MemoryStore::new();
        assert!(store.put("../evil", b"x", "text/plain").is_err());
        assert!(store.put("/abs", b"x", "text/plain").is_err());
    }
}
