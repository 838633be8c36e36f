//! JSON codec for document snapshots
//!
//! Encoding stamps a SHA256 checksum over the payload. Decoding checks the
//! format version and the checksum (when present), then deserializes; feature
//! status envelopes written by older releases are migrated on the way in.

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::{DocumentSnapshot, DOCUMENT_FORMAT_VERSION};
use crate::error::{Result, StorageError};

const CHECKSUM_FIELD: &str = "checksum";

/// Serialize with a fresh checksum
pub fn encode(snapshot: &DocumentSnapshot) -> Result<String> {
    let mut value = serde_json::to_value(snapshot)?;
    let checksum = {
        let object = as_object_mut(&mut value)?;
        object.remove(CHECKSUM_FIELD);
        payload_checksum(&Value::Object(object.clone()))?
    };
    as_object_mut(&mut value)?.insert(CHECKSUM_FIELD.to_string(), Value::String(checksum));
    Ok(serde_json::to_string(&value)?)
}

/// Parse, verify and migrate a stored payload
pub fn decode(payload: &str) -> Result<DocumentSnapshot> {
    let mut value: Value = serde_json::from_str(payload)?;
    let object = as_object_mut(&mut value)?;

    let version = object
        .get("format_version")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if version > u64::from(DOCUMENT_FORMAT_VERSION) {
        return Err(StorageError::unsupported_version(
            u32::try_from(version).unwrap_or(u32::MAX),
            DOCUMENT_FORMAT_VERSION,
        ));
    }

    let stored = match object.remove(CHECKSUM_FIELD) {
        Some(Value::String(sum)) if !sum.is_empty() => Some(sum),
        _ => None,
    };
    if let Some(expected) = &stored {
        let actual = payload_checksum(&Value::Object(object.clone()))?;
        if *expected != actual {
            return Err(StorageError::integrity(expected, &actual));
        }
    } else {
        debug!(format_version = version, "Decoding snapshot without checksum");
    }

    let mut snapshot: DocumentSnapshot = serde_json::from_value(value)?;
    snapshot.checksum = stored.unwrap_or_default();
    Ok(snapshot)
}

/// Hex SHA256 of the canonical (key-sorted) JSON text
fn payload_checksum(value: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

fn as_object_mut(value: &mut Value) -> Result<&mut serde_json::Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| StorageError::serialization("Snapshot payload is not a JSON object"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PersistedStatus;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use shapegraph_core::identity::{RegistrySnapshot, REGISTRY_SNAPSHOT_VERSION};
    use shapegraph_core::{FeatureId, FeatureStatus, StatusClass};

    fn snapshot() -> DocumentSnapshot {
        DocumentSnapshot::new(
            "bracket",
            2,
            RegistrySnapshot {
                version: REGISTRY_SNAPSHOT_VERSION,
                shapes: Vec::new(),
                operations: Vec::new(),
            },
            vec![PersistedStatus {
                feature_id: FeatureId::new("box"),
                status: FeatureStatus::ok(),
            }],
        )
    }

    #[test]
    fn test_encode_stamps_checksum() {
        let payload = encode(&snapshot()).unwrap();
        let decoded = decode(&payload).unwrap();

        assert_eq!(decoded.checksum.len(), 64);
        assert_eq!(decoded.document_id, "bracket");
        assert_eq!(decoded.statuses, snapshot().statuses);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let payload = encode(&snapshot()).unwrap();
        let tampered = payload.replace("\"revision\":2", "\"revision\":5");
        assert_ne!(payload, tampered);

        let err = decode(&tampered).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Integrity);
    }

    #[test]
    fn test_newer_format_rejected() {
        let mut value = serde_json::to_value(snapshot()).unwrap();
        value["format_version"] = serde_json::json!(DOCUMENT_FORMAT_VERSION + 1);

        let err = decode(&value.to_string()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedVersion);
    }

    #[test]
    fn test_legacy_payload_migrates_envelopes() {
        let legacy = serde_json::json!({
            "document_id": "old",
            "revision": 1,
            "saved_at": "2024-01-01T00:00:00Z",
            "registry": { "version": 1, "shapes": [], "operations": [] },
            "statuses": [{
                "feature_id": "pocket",
                "status": {
                    "state": "ERROR",
                    "message": "upstream failed",
                    "details": { "code": "blocked_by_upstream_error", "hint": "Fix the sketch" }
                }
            }]
        });

        let decoded = decode(&legacy.to_string()).unwrap();
        assert_eq!(decoded.format_version, 0);
        assert!(decoded.checksum.is_empty());

        let details = decoded.statuses[0].status.details.as_ref().unwrap();
        assert_eq!(details.status_class, StatusClass::Blocked);
        assert_eq!(details.next_action.as_deref(), Some("Fix the sketch"));
    }

    #[test]
    fn test_non_object_payload() {
        let err = decode("[1, 2, 3]").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Serialization);
    }
}
