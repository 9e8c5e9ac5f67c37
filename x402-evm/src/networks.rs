//! Known EVM network configurations and USDC token deployments.
//!
//! Grounded on the teacher's `r402-evm::networks` constants, re-expressed
//! against CAIP-2 [`ChainId`](x402_core::chain::ChainId)s instead of bare
//! numeric chain references.

use x402_core::chain::NetworkInfo;

/// v1 legacy alias → CAIP-2 `eip155` chain id table, registered into a
/// [`x402_core::chain::NetworkRegistry`] by applications that need v1 support.
pub const EVM_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo { name: "base", namespace: "eip155", reference: "8453" },
    NetworkInfo { name: "base-sepolia", namespace: "eip155", reference: "84532" },
    NetworkInfo { name: "polygon", namespace: "eip155", reference: "137" },
    NetworkInfo { name: "polygon-amoy", namespace: "eip155", reference: "80002" },
    NetworkInfo { name: "avalanche", namespace: "eip155", reference: "43114" },
    NetworkInfo { name: "avalanche-fuji", namespace: "eip155", reference: "43113" },
    NetworkInfo { name: "ethereum", namespace: "eip155", reference: "1" },
    NetworkInfo { name: "celo", namespace: "eip155", reference: "42220" },
    NetworkInfo { name: "celo-sepolia", namespace: "eip155", reference: "11142220" },
];

/// A known stablecoin deployment: contract address plus the EIP-712 domain
/// parameters needed to sign/verify ERC-3009 authorizations against it.
#[derive(Debug, Clone, Copy)]
pub struct StablecoinDeployment {
    /// Checksummed hex contract address.
    pub address: &'static str,
    /// Token decimals.
    pub decimals: u32,
    /// EIP-712 domain `name`.
    pub domain_name: &'static str,
    /// EIP-712 domain `version`.
    pub domain_version: &'static str,
}

/// Resolves a requirement's network string (either a CAIP-2 `eip155:<ref>`
/// identifier or a v1 legacy alias from [`EVM_NETWORKS`]) to its bare
/// `eip155` chain reference, without needing a full
/// [`x402_core::chain::NetworkRegistry`] on hand.
///
/// Scheme mechanisms resolve their own network references this way since
/// `ClientScheme`/`FacilitatorScheme` methods only receive a
/// [`x402_core::hooks::RequirementsView`], not the registry that resolved it.
#[must_use]
pub fn chain_reference(network: &str) -> Option<String> {
    if let Some(reference) = network.strip_prefix("eip155:") {
        return Some(reference.to_string());
    }
    EVM_NETWORKS.iter().find(|info| info.name == network).map(|info| info.reference.to_string())
}

/// Default stablecoin (USDC, except `MegaETH` which uses USDM) per `eip155`
/// chain reference, matching `r402-evm::networks`'s deployment table.
///
/// # Errors
///
/// Returns `None` for a chain reference with no known default asset.
#[must_use]
pub fn default_stablecoin(chain_reference: &str) -> Option<StablecoinDeployment> {
    match chain_reference {
        "8453" => Some(StablecoinDeployment {
            address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            decimals: 6,
            domain_name: "USD Coin",
            domain_version: "2",
        }),
        "84532" => Some(StablecoinDeployment {
            address: "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            decimals: 6,
            domain_name: "USDC",
            domain_version: "2",
        }),
        "1" => Some(StablecoinDeployment {
            address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
            decimals: 6,
            domain_name: "USD Coin",
            domain_version: "2",
        }),
        "137" => Some(StablecoinDeployment {
            address: "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359",
            decimals: 6,
            domain_name: "USD Coin",
            domain_version: "2",
        }),
        "80002" => Some(StablecoinDeployment {
            address: "0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582",
            decimals: 6,
            domain_name: "USDC",
            domain_version: "2",
        }),
        "43114" => Some(StablecoinDeployment {
            address: "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
            decimals: 6,
            domain_name: "USD Coin",
            domain_version: "2",
        }),
        "43113" => Some(StablecoinDeployment {
            address: "0x5425890298aed601595a70AB815c96711a31Bc65",
            decimals: 6,
            domain_name: "USDC",
            domain_version: "2",
        }),
        "42220" => Some(StablecoinDeployment {
            address: "0xcebA9300f2b948710d2653dD7B07f33A8B32118C",
            decimals: 6,
            domain_name: "USDC",
            domain_version: "2",
        }),
        "11142220" => Some(StablecoinDeployment {
            address: "0x01C5C0122039549AD1493B8220cABEdD739BC44E",
            decimals: 6,
            domain_name: "USDC",
            domain_version: "2",
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stablecoin_known_chain() {
        let usdc = default_stablecoin("8453").unwrap();
        assert_eq!(usdc.decimals, 6);
    }

    #[test]
    fn test_chain_reference_resolves_caip2_and_alias() {
        assert_eq!(chain_reference("eip155:8453").as_deref(), Some("8453"));
        assert_eq!(chain_reference("base-sepolia").as_deref(), Some("84532"));
        assert!(chain_reference("unknown-alias").is_none());
    }

    #[test]
    fn test_default_stablecoin_unknown_chain() {
        assert!(default_stablecoin("999999").is_none());
    }
}
