//! Fingerprint templates
//!
//! A template is an opaque byte string produced by the scanner driver or the
//! merge step. Nothing here looks inside it beyond its length. Templates cross
//! process boundaries as standard base64 text.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{Result, RidgelineError};

/// Opaque biometric template bytes
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Template(Vec<u8>);

impl Template {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Decode a base64 payload. Surrounding whitespace is ignored; anything
    /// else that is not valid standard base64 is `InvalidEncoding`.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        STANDARD
            .decode(encoded.trim())
            .map(Self)
            .map_err(|e| RidgelineError::encoding(format!("template is not valid base64: {}", e)))
    }

    /// Decode a base64 payload that must carry at least one byte
    pub fn from_base64_non_empty(encoded: &str) -> Result<Self> {
        let template = Self::from_base64(encoded)?;
        if template.is_empty() {
            return Err(RidgelineError::encoding("template is empty"));
        }
        Ok(template)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Template {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Template {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Template {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Templates are biometric data; keep them out of debug logs.
impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template({} bytes)", self.0.len())
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Template::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_decoding() {
        let template = Template::from_base64("AQID").unwrap();
        assert_eq!(template.as_bytes(), &[1, 2, 3]);
        assert_eq!(template.to_base64(), "AQID");
    }

    #[test]
    fn test_invalid_base64_is_encoding_error() {
        let err = Template::from_base64("not base64!!").unwrap_err();
        assert!(matches!(err, RidgelineError::InvalidEncoding(_)));
    }

    #[test]
    fn test_empty_payload_rejected_when_required() {
        assert!(Template::from_base64("").unwrap().is_empty());
        assert!(matches!(
            Template::from_base64_non_empty(""),
            Err(RidgelineError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_debug_hides_bytes() {
        let template = Template::new(vec![0xAA; 4]);
        assert_eq!(format!("{:?}", template), "Template(4 bytes)");
    }

    #[test]
    fn test_serde_as_base64_string() {
        let template = Template::new(vec![1, 2, 3]);
        let json = serde_json::to_string(&template).unwrap();
        assert_eq!(json, "\"AQID\"");
        let back: Template = serde_json::from_str(&json).unwrap();
        assert_eq!(back, template);
    }
}
