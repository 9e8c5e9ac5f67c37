//! Server-side pricing and requirement enrichment for the `exact` scheme.

use x402_core::amount::{AssetAmount, parse_fiat_price};
use x402_core::chain::ChainId;
use x402_core::proto::{SupportedKind, v2};
use x402_core::scheme::{PriceInput, SchemeError, ServerScheme};

use crate::default_stablecoin;
use crate::exact::types::PaymentRequirementsExtra;

/// `ServerScheme` for ERC-3009 `transferWithAuthorization` payments.
///
/// Resolves fiat prices against the chain's default stablecoin deployment
/// (USDC on every network this crate knows about) and injects the EIP-712
/// domain a client needs to sign against.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eip155ExactServer;

impl ServerScheme for Eip155ExactServer {
    fn scheme(&self) -> &str {
        super::SCHEME
    }

    fn parse_price(&self, price: &PriceInput, network: &ChainId) -> Result<AssetAmount, SchemeError> {
        let deployment = default_stablecoin(network.reference())
            .ok_or_else(|| format!("no default stablecoin known for {network}"))?;
        let amount = match price {
            PriceInput::Money(money) => parse_fiat_price(money, deployment.decimals)?,
            PriceInput::Number(number) => {
                let scaled = number * 10f64.powi(i32::try_from(deployment.decimals).unwrap_or(0));
                let rounded = scaled.round();
                if rounded.is_sign_negative() {
                    return Err("price must be non-negative".into());
                }
                rounded as u128
            }
            PriceInput::Asset(asset) => return Ok(asset.clone()),
        };
        Ok(AssetAmount::new(amount.to_string(), deployment.address.to_string()))
    }

    fn enhance_requirements(
        &self,
        mut requirements: v2::PaymentRequirements,
        _supported: &SupportedKind,
    ) -> v2::PaymentRequirements {
        if let Some(deployment) = default_stablecoin(requirements.network.reference()) {
            let extra = PaymentRequirementsExtra {
                name: deployment.domain_name.to_string(),
                version: deployment.domain_version.to_string(),
            };
            if let Ok(value) = serde_json::to_value(extra) {
                requirements.extra = Some(value);
            }
        }
        requirements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_resolves_fiat_against_base_usdc() {
        let server = Eip155ExactServer;
        let amount = server
            .parse_price(&PriceInput::Money("$0.01".to_string()), &ChainId::new("eip155", "8453"))
            .unwrap();
        assert_eq!(amount.amount, "10000");
        assert_eq!(amount.asset, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
    }

    #[test]
    fn test_parse_price_rejects_unknown_chain() {
        let server = Eip155ExactServer;
        assert!(server.parse_price(&PriceInput::Money("$1".to_string()), &ChainId::new("eip155", "0")).is_err());
    }
}
