//! Typed extension payloads for kind-specific data.
//!
//! Node kinds and command producers sometimes need to carry fields the core
//! model does not know about. Instead of an untyped property bag, such data
//! rides along as an [`Extension`]: an opaque byte payload tagged with a
//! schema id. Only the consumer that understands `schema_id` decodes it.
//!
//! # Example
//!
//! ```ignore
//! use board_engine::Extension;
//!
//! let ext = Extension::encode("http-request/v1", &RequestSettings { timeout: 30 })?;
//! node.extension = Some(ext);
//!
//! // Later, in the code that owns "http-request/v1":
//! let settings: RequestSettings = node.extension.unwrap().decode_as("http-request/v1")?;
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BoardError, Result};

/// Opaque payload tagged with the schema that can read it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    /// Identifier of the payload format, e.g. "http-request/v1"
    pub schema_id: String,
    /// JSON-encoded payload bytes
    pub payload: Vec<u8>,
}

impl Extension {
    /// Wrap already-encoded bytes.
    pub fn new(schema_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            schema_id: schema_id.into(),
            payload,
        }
    }

    /// Encode a value as the payload.
    pub fn encode<T: Serialize>(schema_id: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self {
            schema_id: schema_id.into(),
            payload: serde_json::to_vec(value)?,
        })
    }

    /// Decode the payload without checking the schema id.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Decode the payload after checking it was written for `schema_id`.
    pub fn decode_as<T: DeserializeOwned>(&self, schema_id: &str) -> Result<T> {
        if self.schema_id != schema_id {
            return Err(BoardError::invariant(format!(
                "extension schema '{}' does not match expected '{}'",
                self.schema_id, schema_id
            )));
        }
        self.decode()
    }

    /// Check whether this payload was written for `schema_id`.
    pub fn is(&self, schema_id: &str) -> bool {
        self.schema_id == schema_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Settings {
        timeout: u32,
    }

    #[test]
    fn test_decode_as_matching_schema() {
        let ext = Extension::encode("settings/v1", &Settings { timeout: 30 }).unwrap();
        assert!(ext.is("settings/v1"));

        let decoded: Settings = ext.decode_as("settings/v1").unwrap();
        assert_eq!(decoded, Settings { timeout: 30 });
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        let ext = Extension::encode("settings/v1", &Settings { timeout: 30 }).unwrap();
        let result: Result<Settings> = ext.decode_as("settings/v2");
        assert!(matches!(result, Err(BoardError::InvariantViolation(_))));
    }

    #[test]
    fn test_malformed_payload() {
        let ext = Extension::new("settings/v1", b"not json".to_vec());
        let result: Result<Settings> = ext.decode();
        assert!(matches!(result, Err(BoardError::Serialization(_))));
    }
}
