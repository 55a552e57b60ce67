//! Shared services attached to particles at setup time
//!
//! The host hands every particle a [`Services`] container during setup.
//! Today it carries the JSON codec capability; the container pattern leaves
//! room for further shared capabilities without changing the particle trait.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors related to shared-service access
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service not configured: {0}")]
    NotConfigured(&'static str),
}

/// Container for services shared across all particles in a context
#[derive(Clone, Default)]
pub struct Services {
    json: Option<JsonCodec>,
}

impl Services {
    /// Create a new empty services container
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: add the JSON codec
    pub fn with_json(mut self, json: JsonCodec) -> Self {
        self.json = Some(json);
        self
    }

    /// Get the JSON codec if configured
    pub fn json(&self) -> Option<&JsonCodec> {
        self.json.as_ref()
    }

    /// Get the JSON codec or return an error
    pub fn require_json(&self) -> Result<&JsonCodec, ServiceError> {
        self.json.as_ref().ok_or(ServiceError::NotConfigured("json"))
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("json", &self.json.is_some())
            .finish()
    }
}

/// Shared JSON parsing capability
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Parse a JSON document
    pub fn parse(&self, text: &str) -> Result<JsonValue, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Render a JSON document as a string
    pub fn to_string(&self, value: &JsonValue) -> Result<String, serde_json::Error> {
        serde_json::to_string(value)
    }

    /// Parse a JSON document into a typed value
    pub fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode a typed value as a JSON document
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, serde_json::Error> {
        serde_json::to_string(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_json() {
        let empty = Services::new();
        assert!(empty.require_json().is_err());

        let services = Services::new().with_json(JsonCodec);
        assert!(services.require_json().is_ok());
    }

    #[test]
    fn test_json_codec_roundtrip() {
        let codec = JsonCodec;
        let value = json!({"name": "ok"});
        let text = codec.to_string(&value).unwrap();
        assert_eq!(codec.parse(&text).unwrap(), value);
    }
}
