//! SHA-256 hashing over raw or canonical-JSON bytes.
//!
//! Deterministic: same canonical structure ⇒ same lowercase 64-hex across
//! OS/arch. Checksum verification failures are fatal by contract.

use digest::Digest;
use serde::Serialize;
use sha2::Sha256;

use crate::canonical_json::to_canonical_bytes;
use crate::IoError;

/// Compute lowercase 64-hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of the canonical JSON representation; returns lowercase 64-hex.
pub fn sha256_canonical<T: Serialize>(value: &T) -> Result<String, IoError> {
    let bytes = to_canonical_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

/// Verify bytes against an expected checksum; mismatch is fatal.
pub fn verify_sha256(bytes: &[u8], expected_sha256_hex: &str) -> Result<(), IoError> {
    let actual = sha256_hex(bytes);
    if actual != expected_sha256_hex {
        return Err(IoError::ArtifactChecksumMismatch {
            expected: expected_sha256_hex.to_string(),
            actual,
        });
    }
    Ok(())
}

/// True iff string is **lowercase** 64-hex.
pub fn is_hex64(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_digest() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn canonical_digest_is_key_order_independent() {
        let a = json!({"x": 1, "y": "z"});
        let b = json!({"y": "z", "x": 1});
        assert_eq!(
            sha256_canonical(&a).unwrap(),
            sha256_canonical(&b).unwrap()
        );
    }

    #[test]
    fn verify_detects_single_byte_change() {
        let bytes = b"payload".to_vec();
        let sum = sha256_hex(&bytes);
        assert!(verify_sha256(&bytes, &sum).is_ok());

        let mut tampered = bytes;
        tampered[0] ^= 1;
        let err = verify_sha256(&tampered, &sum).unwrap_err();
        assert!(matches!(err, IoError::ArtifactChecksumMismatch { .. }));
    }

    #[test]
    fn hex64_shape() {
        assert!(is_hex64(&sha256_hex(b"x")));
        assert!(!is_hex64("ABC"));
    }
}
