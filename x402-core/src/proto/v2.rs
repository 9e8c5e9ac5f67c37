//! Version-2 wire types: `network` is CAIP-2, `accepted` is nested in the payload.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::chain::ChainId;
use crate::proto::version::{V2, X402Version2};

/// Resource metadata echoed between `PaymentRequired` and `PaymentPayload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// Canonical URL of the priced resource.
    pub url: String,
    /// Human-readable description.
    pub description: String,
    /// MIME type of the resource response.
    pub mime_type: String,
}

/// One payment option a server is willing to accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment construction style (e.g. `"exact"`).
    pub scheme: String,
    /// CAIP-2 network identifier.
    pub network: ChainId,
    /// Atomic-unit amount, as a non-negative integer string.
    pub amount: String,
    /// Recipient identifier, scheme-specific format.
    pub pay_to: String,
    /// Scheme-specific asset identifier.
    pub asset: String,
    /// Seconds after which a created payload for this requirement is stale.
    pub max_timeout_seconds: u64,
    /// Scheme-specific extra metadata (EIP-712 domain, fee payer, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl PaymentRequirements {
    /// Match criterion used by `ResourceServer::find_matching_requirements`:
    /// `scheme`, `network`, `amount`, `asset`, `pay_to` all equal.
    ///
    /// Deliberately excludes `max_timeout_seconds` and `extra`, mirroring the
    /// upstream reference implementation, so that facilitator-side
    /// enrichment of those fields after the requirement was first offered
    /// does not cause a false-negative match.
    #[must_use]
    pub fn matches_accepted(&self, accepted: &Self) -> bool {
        self.scheme == accepted.scheme
            && self.network == accepted.network
            && self.amount == accepted.amount
            && self.asset == accepted.asset
            && self.pay_to == accepted.pay_to
    }
}

/// The 402 response body: advertises one or more accepted payment options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Always `2`.
    pub x402_version: X402Version2,
    /// The resource this payment unlocks.
    pub resource: ResourceInfo,
    /// Accepted payment options, in server preference order.
    pub accepts: Vec<PaymentRequirements>,
    /// Declared extension info, keyed by extension name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<super::Extensions>,
    /// Human-readable diagnostic, not for programmatic use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentRequired {
    /// Builds a `PaymentRequired` with the version fixed to 2.
    #[must_use]
    pub fn new(
        resource: ResourceInfo,
        accepts: Vec<PaymentRequirements>,
        extensions: Option<super::Extensions>,
        error: Option<String>,
    ) -> Self {
        Self {
            x402_version: V2,
            resource,
            accepts,
            extensions,
            error,
        }
    }
}

/// The signed retry request body: the chosen requirement plus its authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Always `2`.
    pub x402_version: X402Version2,
    /// Echoed resource info from the `PaymentRequired` this responds to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
    /// The exact requirement the client selected.
    pub accepted: PaymentRequirements,
    /// Scheme-specific signed authorization.
    pub payload: serde_json::Value,
    /// Extension info the client is providing alongside the payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<HashMap<String, serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements(amount: &str) -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".into(),
            network: ChainId::new("eip155", "8453"),
            amount: amount.into(),
            pay_to: "0xabc".into(),
            asset: "0xusdc".into(),
            max_timeout_seconds: 300,
            extra: None,
        }
    }

    #[test]
    fn test_matches_accepted_ignores_timeout_and_extra() {
        let mut offered = requirements("1000");
        let mut accepted = requirements("1000");
        offered.max_timeout_seconds = 60;
        accepted.extra = Some(serde_json::json!({"enriched": true}));
        assert!(offered.matches_accepted(&accepted));
    }

    #[test]
    fn test_matches_accepted_rejects_amount_mismatch() {
        let offered = requirements("1000");
        let accepted = requirements("2000");
        assert!(!offered.matches_accepted(&accepted));
    }

    #[test]
    fn test_payment_required_serializes_version_as_integer() {
        let required = PaymentRequired::new(
            ResourceInfo { url: "https://x".into(), description: String::new(), mime_type: "application/json".into() },
            vec![requirements("1000")],
            None,
            None,
        );
        let value = serde_json::to_value(&required).unwrap();
        assert_eq!(value["x402Version"], 2);
    }
}
