//! Version-1 (legacy) wire types: bare network aliases, top-level `scheme`/`network`.

use serde::{Deserialize, Serialize};

use crate::proto::v2::ResourceInfo;
use crate::proto::version::{V1, X402Version1};

/// A v1 payment option, using a legacy network alias (e.g. `"base-sepolia"`)
/// instead of a CAIP-2 identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment construction style (e.g. `"exact"`).
    pub scheme: String,
    /// Legacy network alias.
    pub network: String,
    /// Atomic-unit amount, as a non-negative integer string.
    pub amount: String,
    /// Recipient identifier.
    pub pay_to: String,
    /// Scheme-specific asset identifier.
    pub asset: String,
    /// Seconds after which a created payload for this requirement is stale.
    pub max_timeout_seconds: u64,
    /// Scheme-specific extra metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl PaymentRequirements {
    /// Same five-field match rule as [`crate::proto::v2::PaymentRequirements::matches_accepted`].
    #[must_use]
    pub fn matches_accepted(&self, accepted: &Self) -> bool {
        self.scheme == accepted.scheme
            && self.network == accepted.network
            && self.amount == accepted.amount
            && self.asset == accepted.asset
            && self.pay_to == accepted.pay_to
    }
}

/// The v1 402 response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Always `1`.
    pub x402_version: X402Version1,
    /// The resource this payment unlocks.
    pub resource: ResourceInfo,
    /// Accepted payment options.
    pub accepts: Vec<PaymentRequirements>,
    /// Human-readable diagnostic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentRequired {
    /// Builds a v1 `PaymentRequired`.
    #[must_use]
    pub fn new(resource: ResourceInfo, accepts: Vec<PaymentRequirements>, error: Option<String>) -> Self {
        Self {
            x402_version: V1,
            resource,
            accepts,
            error,
        }
    }
}

/// The v1 signed retry request body.
///
/// Unlike v2, `scheme`/`network` are top-level fields rather than nested
/// inside a single `accepted` requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Always `1`.
    pub x402_version: X402Version1,
    /// Payment construction style.
    pub scheme: String,
    /// Legacy network alias.
    pub network: String,
    /// Echoed resource info.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
    /// Scheme-specific signed authorization.
    pub payload: serde_json::Value,
}

impl PaymentPayload {
    /// Reconstructs the matching [`PaymentRequirements`] shape from this
    /// payload's top-level `scheme`/`network`/`payload`-independent fields,
    /// for use with [`PaymentRequirements::matches_accepted`]. Amount/asset/
    /// `payTo` are not recoverable from the payload alone and must be
    /// supplied by the caller from whichever requirement it believes was
    /// selected.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The legacy network alias this payload was created for.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_payload_top_level_scheme_network() {
        let payload = PaymentPayload {
            x402_version: V1,
            scheme: "exact".into(),
            network: "base-sepolia".into(),
            resource: None,
            payload: serde_json::json!({}),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["scheme"], "exact");
        assert_eq!(value["network"], "base-sepolia");
        assert!(value.get("accepted").is_none());
    }
}
