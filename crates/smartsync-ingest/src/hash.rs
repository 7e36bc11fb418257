//! Provenance hashing.

use sha2::{Digest, Sha256};

use crate::RawRow;

/// Lower-case hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hash of a single raw row in its serialized, key-ordered form.
#[must_use]
pub fn row_hash(row: &RawRow) -> String {
    // Serializing a `Map<String, Value>` cannot fail.
    let encoded = serde_json::to_vec(row).unwrap_or_default();
    sha256_hex(&encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn row_hash_changes_with_content() {
        let a = json!({"sku": "A", "qty": 1}).as_object().cloned().unwrap();
        let b = json!({"sku": "A", "qty": 2}).as_object().cloned().unwrap();
        assert_ne!(row_hash(&a), row_hash(&b));
        assert_eq!(row_hash(&a), row_hash(&a.clone()));
    }
}
