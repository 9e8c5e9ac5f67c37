//! Per-route configuration consumed by `ResourceServer::build_payment_requirements`.

use serde::{Deserialize, Serialize};

use crate::chain::NetworkPattern;

/// Describes one priced route: which network/scheme to accept payment on,
/// who gets paid, and how much.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    /// Payment construction style to require (e.g. `"exact"`).
    pub scheme: String,
    /// Network pattern this route accepts payment on.
    pub network: NetworkPattern,
    /// Recipient identifier, scheme-specific format.
    pub pay_to: String,
    /// Price: a `"$0.001"`-style fiat string, a raw number, or a
    /// pre-resolved `{amount, asset}` object.
    pub price: serde_json::Value,
    /// Overrides the mechanism's default authorization lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    /// Additional scheme-specific fields merged into the built requirement's `extra`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_config_deserialize() {
        let json = serde_json::json!({
            "scheme": "exact",
            "network": "eip155:8453",
            "payTo": "0xabc",
            "price": "$0.01",
        });
        let config: ResourceConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.scheme, "exact");
        assert_eq!(config.pay_to, "0xabc");
    }
}
