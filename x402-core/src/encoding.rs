//! Base64 helpers for the protocol's header transport.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use std::fmt::Display;

/// Wraps base64-encoded bytes, as carried in the `PAYMENT-REQUIRED` /
/// `PAYMENT-SIGNATURE` / `PAYMENT-RESPONSE` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    /// Decodes the wrapped base64 text to raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the wrapped bytes are not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    /// Encodes arbitrary bytes into base64 text, wrapped in `Self`.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Self {
        Self(b64.encode(input.as_ref()).into_bytes())
    }

    /// Encodes a JSON-serializable value directly to base64 text.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` fails to serialize.
    pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::encode(serde_json::to_vec(value)?))
    }

    /// Decodes the wrapped base64 text and deserializes it as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid base64 or not valid JSON
    /// for `T`.
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, DecodeJsonError> {
        let raw = self.decode()?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Error decoding a [`Base64Bytes`] payload as JSON.
#[derive(Debug, thiserror::Error)]
pub enum DecodeJsonError {
    /// The wrapped text was not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes were not valid JSON for the target type.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl AsRef<[u8]> for Base64Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Base64Bytes {
    fn from(slice: &[u8]) -> Self {
        Self(slice.to_vec())
    }
}

impl Display for Base64Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Demo {
        value: u32,
    }

    #[test]
    fn test_roundtrip_bytes() {
        let encoded = Base64Bytes::encode(b"hello");
        assert_eq!(encoded.decode().unwrap(), b"hello");
    }

    #[test]
    fn test_roundtrip_json() {
        let demo = Demo { value: 42 };
        let encoded = Base64Bytes::encode_json(&demo).unwrap();
        let decoded: Demo = encoded.decode_json().unwrap();
        assert_eq!(decoded, demo);
    }
}
