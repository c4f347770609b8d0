//! Hashing System - SHA-256 for Content Addressing
//!
//! Source documents and stored artifacts are identified by the digest of
//! their full byte content. Render settings are fingerprinted through
//! canonical JSON so that equal settings always hash equal.

use sha2::{Sha256, Digest};
use serde::Serialize;
use serde_json::{Value, to_string};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{LayerError, Result};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Stream a file through SHA-256 without loading it whole
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| LayerError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = file.read(&mut buffer).map_err(|e| LayerError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> std::result::Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let sorted_map: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            Value::Object(sorted_map)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Stable digest of anything that changes rendered output
pub fn fingerprint<T: Serialize>(value: &T) -> Result<String> {
    let canonical = canonical_json(value)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": 3});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_file_hash_matches_bytes_hash() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let payload = vec![7u8; 20_000];
        file.write_all(&payload).unwrap();
        file.flush().unwrap();

        assert_eq!(file_sha256(file.path()).unwrap(), sha256_hex(&payload));
    }

    #[test]
    fn test_file_hash_missing_file_is_io_error() {
        let err = file_sha256(Path::new("/definitely/not/here.svg")).unwrap_err();
        assert_eq!(err.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = json!({"format": "png", "textToPath": true});
        let b = json!({"textToPath": true, "format": "png"});
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }
}
