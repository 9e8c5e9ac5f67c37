//! Server-side pricing and requirement enrichment for the `exact` scheme.

use x402_core::amount::{AssetAmount, parse_fiat_price};
use x402_core::chain::ChainId;
use x402_core::proto::{SupportedKind, v2};
use x402_core::scheme::{PriceInput, SchemeError, ServerScheme};

use crate::default_stablecoin;
use crate::exact::types::PaymentRequirementsExtra;

/// `ServerScheme` for Solana SPL Token `exact` payments.
///
/// Resolves fiat prices against the chain's default stablecoin deployment
/// (native Circle USDC on every network this crate knows about) and
/// injects the facilitator's fee-payer address into `requirements.extra`,
/// read back out of the facilitator's own `SupportedKind.extra`
/// (`FacilitatorScheme::get_extra`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SolanaExactServer;

impl ServerScheme for SolanaExactServer {
    fn scheme(&self) -> &str {
        super::SCHEME
    }

    fn parse_price(&self, price: &PriceInput, network: &ChainId) -> Result<AssetAmount, SchemeError> {
        let deployment = default_stablecoin(network.reference())
            .ok_or_else(|| format!("no default stablecoin known for {network}"))?;
        let amount = match price {
            PriceInput::Money(money) => parse_fiat_price(money, u32::from(deployment.decimals))?,
            PriceInput::Number(number) => {
                let scaled = number * 10f64.powi(i32::from(deployment.decimals));
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
        supported: &SupportedKind,
    ) -> v2::PaymentRequirements {
        if requirements.extra.is_some() {
            return requirements;
        }
        let extra = supported
            .extra
            .as_ref()
            .and_then(|extra| serde_json::from_value::<PaymentRequirementsExtra>(extra.clone()).ok());
        if let Some(extra) = extra {
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
    fn test_parse_price_resolves_fiat_against_solana_usdc() {
        let server = SolanaExactServer;
        let amount = server
            .parse_price(&PriceInput::Money("$0.01".to_string()), &ChainId::new("solana", "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp"))
            .unwrap();
        assert_eq!(amount.amount, "10000");
        assert_eq!(amount.asset, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
    }

    #[test]
    fn test_parse_price_rejects_unknown_chain() {
        let server = SolanaExactServer;
        assert!(server.parse_price(&PriceInput::Money("$1".to_string()), &ChainId::new("solana", "unknown")).is_err());
    }
}
