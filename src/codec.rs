//! Encoding of cached embeddings as git note lines.
//!
//! Each record is one JSON object on one line:
//!
//! ```text
//! {"type":"commit","model":"text-embedding-3-small","dimensions":512,"file":"","vector":"<base64>"}
//! ```
//!
//! `vector` is the base64 (standard alphabet, padded) encoding of the
//! concatenated little-endian IEEE-754 `f64` values, so a decode reproduces
//! the encoded vector bit for bit. `file` is empty for commit-level records
//! and holds the path for file-level ones.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{EmbeddingRecord, OwnerKind};

#[derive(Debug, Serialize, Deserialize)]
struct NoteBody {
    #[serde(rename = "type")]
    kind: OwnerKind,
    model: String,
    dimensions: u32,
    #[serde(default)]
    file: String,
    vector: String,
}

/// Pack `vector` as little-endian `f64` bytes.
pub fn pack_f64(vector: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 8);
    for &v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverse of [`pack_f64`]. The byte length must be a multiple of 8.
pub fn unpack_f64(bytes: &[u8]) -> Result<Vec<f64>> {
    if bytes.len() % 8 != 0 {
        return Err(Error::Decode(format!(
            "vector byte length {} is not a multiple of 8",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// Serialize one record to a single JSON line.
pub fn encode(record: &EmbeddingRecord) -> Result<String> {
    if record.vector.is_empty() || record.dimensions == 0 {
        return Err(Error::Decode("cannot encode an empty embedding".to_string()));
    }
    if record.vector.len() != record.dimensions as usize {
        return Err(Error::Decode(format!(
            "vector has {} values but dimensions is {}",
            record.vector.len(),
            record.dimensions
        )));
    }

    let file = match record.owner {
        OwnerKind::Commit => String::new(),
        OwnerKind::File => record.target_key.clone(),
    };

    let body = NoteBody {
        kind: record.owner,
        model: record.model.clone(),
        dimensions: record.dimensions,
        file,
        vector: STANDARD.encode(pack_f64(&record.vector)),
    };

    serde_json::to_string(&body).map_err(|e| Error::Decode(e.to_string()))
}

/// Parse one note line attached to `commit_hash`.
pub fn decode(commit_hash: &str, line: &str) -> Result<EmbeddingRecord> {
    let body: NoteBody =
        serde_json::from_str(line).map_err(|e| Error::Decode(format!("invalid note JSON: {}", e)))?;

    let bytes = STANDARD
        .decode(body.vector.as_bytes())
        .map_err(|e| Error::Decode(format!("invalid base64 vector: {}", e)))?;
    let vector = unpack_f64(&bytes)?;

    if body.dimensions == 0 {
        return Err(Error::Decode("dimensions must be > 0".to_string()));
    }
    if vector.len() != body.dimensions as usize {
        return Err(Error::Decode(format!(
            "vector has {} values but dimensions is {}",
            vector.len(),
            body.dimensions
        )));
    }

    let target_key = match body.kind {
        OwnerKind::Commit if body.file.is_empty() => commit_hash.to_string(),
        OwnerKind::Commit => {
            return Err(Error::Decode(format!(
                "commit record unexpectedly names file '{}'",
                body.file
            )))
        }
        OwnerKind::File if body.file.is_empty() => {
            return Err(Error::Decode("file record without a file path".to_string()))
        }
        OwnerKind::File => body.file,
    };

    Ok(EmbeddingRecord {
        owner: body.kind,
        target_key,
        model: body.model,
        dimensions: body.dimensions,
        vector,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    fn bits(v: &[f64]) -> Vec<u64> {
        v.iter().map(|x| x.to_bits()).collect()
    }

    #[test]
    fn test_roundtrip_is_bit_exact() {
        let vector = vec![
            0.1,
            -0.0,
            f64::MIN_POSITIVE / 2.0,
            f64::MAX,
            -1.0e-300,
            std::f64::consts::PI,
        ];
        let record = EmbeddingRecord::for_commit(HASH, "text-embedding-3-small", 6, vector);

        let line = encode(&record).unwrap();
        assert!(!line.contains('\n'));
        let decoded = decode(HASH, &line).unwrap();

        assert_eq!(decoded.owner, OwnerKind::Commit);
        assert_eq!(decoded.target_key, HASH);
        assert_eq!(decoded.model, record.model);
        assert_eq!(decoded.dimensions, 6);
        assert_eq!(bits(&decoded.vector), bits(&record.vector));
    }

    #[test]
    fn test_nan_payload_survives() {
        let nan = f64::from_bits(0x7ff8_0000_dead_beef);
        let record = EmbeddingRecord::for_commit(HASH, "m", 2, vec![nan, 1.0]);
        let decoded = decode(HASH, &encode(&record).unwrap()).unwrap();
        assert_eq!(bits(&decoded.vector), bits(&record.vector));
    }

    #[test]
    fn test_file_record_roundtrip() {
        let record = EmbeddingRecord::for_file("src/lib.rs", "m", 2, vec![1.5, -2.5]);
        let line = encode(&record).unwrap();
        assert!(line.contains("\"type\":\"file\""));
        assert!(line.contains("\"file\":\"src/lib.rs\""));
        assert_eq!(decode(HASH, &line).unwrap(), record);
    }

    #[test]
    fn test_wire_format() {
        let record = EmbeddingRecord::for_commit(HASH, "m", 1, vec![1.0]);
        let line = encode(&record).unwrap();
        // 1.0f64 little-endian = 00 00 00 00 00 00 F0 3F
        assert_eq!(
            line,
            r#"{"type":"commit","model":"m","dimensions":1,"file":"","vector":"AAAAAAAA8D8="}"#
        );
    }

    #[test]
    fn test_rejects_unknown_owner_kind() {
        let line = r#"{"type":"directory","model":"m","dimensions":1,"file":"","vector":"AAAAAAAA8D8="}"#;
        assert!(matches!(decode(HASH, line), Err(Error::Decode(_))));
    }

    #[test]
    fn test_rejects_truncated_vector() {
        // 7 bytes of payload
        let line = r#"{"type":"commit","model":"m","dimensions":1,"file":"","vector":"AAAAAAAA8A=="}"#;
        let err = decode(HASH, line).unwrap_err();
        assert!(err.to_string().contains("multiple of 8"));
    }

    #[test]
    fn test_rejects_dimension_mismatch() {
        let line = r#"{"type":"commit","model":"m","dimensions":2,"file":"","vector":"AAAAAAAA8D8="}"#;
        assert!(matches!(decode(HASH, line), Err(Error::Decode(_))));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(decode(HASH, "not json"), Err(Error::Decode(_))));
        let bad_b64 = r#"{"type":"commit","model":"m","dimensions":1,"file":"","vector":"!!"}"#;
        assert!(matches!(decode(HASH, bad_b64), Err(Error::Decode(_))));
    }

    #[test]
    fn test_encode_rejects_inconsistent_record() {
        let record = EmbeddingRecord::for_commit(HASH, "m", 3, vec![1.0]);
        assert!(encode(&record).is_err());
        let empty = EmbeddingRecord::for_commit(HASH, "m", 0, vec![]);
        assert!(encode(&empty).is_err());
    }
}
