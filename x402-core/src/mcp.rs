//! Data-shape conventions for carrying x402 over MCP tool calls.
//!
//! The MCP transport bridge itself (wiring this into an actual MCP server
//! loop) is not part of this crate; this module only gives adapters outside
//! it a shared vocabulary: the `_meta` keys and the tool-result envelope
//! shape a payment-required response takes.

use serde::{Deserialize, Serialize};

/// `_meta` key a client attaches its `PaymentPayload` under, in the request
/// that retries a payment-required tool call.
pub const PAYMENT_META_KEY: &str = "x402/payment";

/// `_meta` key a server attaches its `SettleResponse` under, in the result
/// of a tool call that completed payment.
pub const PAYMENT_RESPONSE_META_KEY: &str = "x402/payment-response";

/// One content item of an MCP tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentItem {
    /// Plain text content.
    Text {
        /// The text payload.
        text: String,
    },
}

impl ContentItem {
    /// Builds a text content item.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The text payload, if this is a `Text` item.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
        }
    }
}

/// A payment-required MCP tool result: `isError: true`, with the
/// `PaymentRequired` JSON surfaced both as `structuredContent` (for clients
/// that understand it) and as `content[0].text` (for clients that only read text).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredToolResult {
    /// Always `true`.
    pub is_error: bool,
    /// Human/simple-client-readable rendering.
    pub content: Vec<ContentItem>,
    /// Machine-readable `PaymentRequired` body.
    pub structured_content: serde_json::Value,
}

impl PaymentRequiredToolResult {
    /// Builds a payment-required tool result from a `PaymentRequired` JSON value.
    #[must_use]
    pub fn new(payment_required: serde_json::Value) -> Self {
        Self {
            is_error: true,
            content: vec![ContentItem::text(payment_required.to_string())],
            structured_content: payment_required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_required_tool_result_echoes_both_surfaces() {
        let payload = serde_json::json!({"x402Version": 2});
        let result = PaymentRequiredToolResult::new(payload.clone());
        assert!(result.is_error);
        assert_eq!(result.structured_content, payload);
        assert_eq!(result.content[0].as_text(), Some(payload.to_string().as_str()));
    }
}
