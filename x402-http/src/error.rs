//! Error types for the HTTP transport layer.

/// Errors that can occur while encoding/decoding x402 headers.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded JSON carried no recognized `x402Version`.
    #[error("unrecognized or missing x402Version field")]
    UnknownVersion,
}
