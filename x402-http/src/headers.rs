//! HTTP header encoding and decoding for x402 protocol messages.
//!
//! Handles Base64-encoded JSON payloads in `PAYMENT-SIGNATURE`,
//! `PAYMENT-REQUIRED`, `PAYMENT-RESPONSE`, and legacy `X-PAYMENT`/
//! `X-PAYMENT-RESPONSE` headers. Header lookups are case-insensitive for
//! free: `http::HeaderMap` normalizes header names on both insert and
//! lookup.

use base64::prelude::*;
use http::HeaderMap;
use x402_core::hooks::{PaymentRequiredView, PayloadView};
use x402_core::proto::{SettleResponse, v1, v2};

use crate::constants::{
    PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER, PAYMENT_SIGNATURE_HEADER, X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER,
};
use crate::error::HttpError;

fn detect_version(value: &serde_json::Value) -> Result<u8, HttpError> {
    match value.get("x402Version").and_then(serde_json::Value::as_u64) {
        Some(1) => Ok(1),
        Some(2) => Ok(2),
        _ => Err(HttpError::UnknownVersion),
    }
}

/// Encodes a [`PaymentRequiredView`] as a Base64 JSON string for the
/// `PAYMENT-REQUIRED` header (used for both protocol versions).
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_required(required: &PaymentRequiredView) -> Result<String, HttpError> {
    let json = match required {
        PaymentRequiredView::V1(r) => serde_json::to_vec(r)?,
        PaymentRequiredView::V2(r) => serde_json::to_vec(r)?,
    };
    Ok(BASE64_STANDARD.encode(json))
}

/// Decodes a `PAYMENT-REQUIRED` header value into a version-tagged
/// [`PaymentRequiredView`].
///
/// # Errors
///
/// Returns [`HttpError`] on Base64/JSON decode failure or an unrecognized
/// `x402Version`.
pub fn decode_payment_required(header_value: &str) -> Result<PaymentRequiredView, HttpError> {
    let bytes = BASE64_STANDARD.decode(header_value.trim())?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    match detect_version(&value)? {
        1 => Ok(PaymentRequiredView::V1(serde_json::from_value(value)?)),
        _ => Ok(PaymentRequiredView::V2(serde_json::from_value(value)?)),
    }
}

/// Encodes a [`PayloadView`] as a Base64 JSON string for the
/// `PAYMENT-SIGNATURE` (v2) or `X-PAYMENT` (v1) header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_payload(payload: &PayloadView) -> Result<String, HttpError> {
    let json = match payload {
        PayloadView::V1(p) => serde_json::to_vec(p)?,
        PayloadView::V2(p) => serde_json::to_vec(p)?,
    };
    Ok(BASE64_STANDARD.encode(json))
}

/// Decodes a `PAYMENT-SIGNATURE` or `X-PAYMENT` header value into a
/// version-tagged [`PayloadView`].
///
/// # Errors
///
/// Returns [`HttpError`] on Base64/JSON decode failure or an unrecognized
/// `x402Version`.
pub fn decode_payment_payload(header_value: &str) -> Result<PayloadView, HttpError> {
    let bytes = BASE64_STANDARD.decode(header_value.trim())?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    match detect_version(&value)? {
        1 => Ok(PayloadView::V1(serde_json::from_value::<v1::PaymentPayload>(value)?)),
        _ => Ok(PayloadView::V2(Box::new(serde_json::from_value::<v2::PaymentPayload>(value)?))),
    }
}

/// Encodes a [`SettleResponse`] as a Base64 JSON string for the
/// `PAYMENT-RESPONSE`/`X-PAYMENT-RESPONSE` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_settle_response(response: &SettleResponse) -> Result<String, HttpError> {
    Ok(BASE64_STANDARD.encode(serde_json::to_vec(response)?))
}

/// Decodes a `PAYMENT-RESPONSE`/`X-PAYMENT-RESPONSE` header value into a
/// [`SettleResponse`].
///
/// # Errors
///
/// Returns [`HttpError`] on Base64/JSON decode failure.
pub fn decode_settle_response(header_value: &str) -> Result<SettleResponse, HttpError> {
    let bytes = BASE64_STANDARD.decode(header_value.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// The header name carrying a payment payload for `version` (v1 uses the
/// legacy `X-PAYMENT` header, v2 uses `PAYMENT-SIGNATURE`).
#[must_use]
pub const fn payload_header_name(version: u8) -> &'static str {
    if version == 1 { X_PAYMENT_HEADER } else { PAYMENT_SIGNATURE_HEADER }
}

/// The header name carrying a settlement result for `version`.
#[must_use]
pub const fn response_header_name(version: u8) -> &'static str {
    if version == 1 { X_PAYMENT_RESPONSE_HEADER } else { PAYMENT_RESPONSE_HEADER }
}

/// Reads whichever payment-payload header is present (v2 first, then the
/// v1 fallback), returning its raw string value.
#[must_use]
pub fn extract_payment_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(PAYMENT_SIGNATURE_HEADER).or_else(|| headers.get(X_PAYMENT_HEADER)).and_then(|v| v.to_str().ok())
}

/// Reads whichever `PAYMENT-REQUIRED` header is present, returning its raw
/// string value.
#[must_use]
pub fn extract_payment_required_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(PAYMENT_REQUIRED_HEADER).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use x402_core::chain::ChainId;
    use x402_core::proto::v2::{PaymentRequirements, ResourceInfo};

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_string(),
            network: "eip155:8453".parse::<ChainId>().unwrap(),
            amount: "1000".to_string(),
            pay_to: "0xabc".to_string(),
            asset: "0xusdc".to_string(),
            max_timeout_seconds: 60,
            extra: None,
        }
    }

    #[test]
    fn test_payment_required_header_roundtrip() {
        let required = v2::PaymentRequired::new(
            ResourceInfo { url: "https://api.example.com/forecast".to_string(), description: String::new(), mime_type: "application/json".to_string() },
            vec![requirements()],
            None,
            None,
        );
        let encoded = encode_payment_required(&PaymentRequiredView::V2(required.clone())).unwrap();
        let decoded = decode_payment_required(&encoded).unwrap();
        match decoded {
            PaymentRequiredView::V2(r) => assert_eq!(r.accepts.len(), required.accepts.len()),
            PaymentRequiredView::V1(_) => panic!("expected v2"),
        }
    }

    #[test]
    fn test_payment_payload_header_roundtrip() {
        let payload = v2::PaymentPayload {
            x402_version: x402_core::proto::version::V2,
            resource: None,
            accepted: requirements(),
            payload: serde_json::json!({"signature": "0xdead"}),
            extensions: None,
        };
        let encoded = encode_payment_payload(&PayloadView::V2(Box::new(payload))).unwrap();
        let decoded = decode_payment_payload(&encoded).unwrap();
        assert!(matches!(decoded, PayloadView::V2(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let encoded = BASE64_STANDARD.encode(serde_json::to_vec(&serde_json::json!({"x402Version": 9})).unwrap());
        assert!(matches!(decode_payment_payload(&encoded), Err(HttpError::UnknownVersion)));
    }

    #[test]
    fn test_settle_response_header_roundtrip() {
        let response =
            SettleResponse::Success { payer: "0xabc".to_string(), transaction: "0xdead".to_string(), network: "eip155:8453".parse::<ChainId>().unwrap() };
        let encoded = encode_settle_response(&response).unwrap();
        let decoded = decode_settle_response(&encoded).unwrap();
        assert!(matches!(decoded, SettleResponse::Success { transaction, .. } if transaction == "0xdead"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("payment-signature", "abc".parse().unwrap());
        assert_eq!(extract_payment_header(&headers), Some("abc"));
    }

    #[test]
    fn test_payload_header_name_picks_legacy_for_v1() {
        assert_eq!(payload_header_name(1), X_PAYMENT_HEADER);
        assert_eq!(payload_header_name(2), PAYMENT_SIGNATURE_HEADER);
    }
}
