//! Known Solana network configurations and USDC token deployments.
//!
//! Grounded on the teacher's `r402-svm::networks` table, re-expressed
//! against CAIP-2 [`ChainId`](x402_core::chain::ChainId)s instead of bare
//! genesis-hash references.

use x402_core::chain::NetworkInfo;

/// v1 legacy alias → CAIP-2 `solana` chain id table, registered into a
/// [`x402_core::chain::NetworkRegistry`] by applications that need v1
/// support. Solana chains are identified by the first 32 base58 characters
/// of their genesis block hash.
pub const SOLANA_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo { name: "solana", namespace: "solana", reference: "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp" },
    NetworkInfo { name: "solana-devnet", namespace: "solana", reference: "EtWTRABZaYq6iMfeYKouRu166VU2xqa1" },
];

/// A known stablecoin deployment: mint address plus decimals.
#[derive(Debug, Clone, Copy)]
pub struct StablecoinDeployment {
    /// Base58-encoded SPL mint address.
    pub address: &'static str,
    /// Token decimals.
    pub decimals: u8,
}

/// Resolves a requirement's network string (either a CAIP-2 `solana:<ref>`
/// identifier or a v1 legacy alias from [`SOLANA_NETWORKS`]) to its bare
/// genesis-hash chain reference, without needing a full
/// [`x402_core::chain::NetworkRegistry`] on hand.
///
/// Scheme mechanisms resolve their own network references this way since
/// `ClientScheme`/`FacilitatorScheme` methods only receive a
/// [`x402_core::hooks::RequirementsView`], not the registry that resolved it.
#[must_use]
pub fn chain_reference(network: &str) -> Option<String> {
    if let Some(reference) = network.strip_prefix("solana:") {
        return Some(reference.to_string());
    }
    SOLANA_NETWORKS.iter().find(|info| info.name == network).map(|info| info.reference.to_string())
}

/// Default stablecoin (native Circle USDC, SPL Token program) per `solana`
/// chain reference, matching `r402-svm::networks`'s deployment table.
///
/// # Errors
///
/// Returns `None` for a chain reference with no known default asset.
#[must_use]
pub fn default_stablecoin(chain_reference: &str) -> Option<StablecoinDeployment> {
    match chain_reference {
        "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp" => {
            Some(StablecoinDeployment { address: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", decimals: 6 })
        }
        "EtWTRABZaYq6iMfeYKouRu166VU2xqa1" => {
            Some(StablecoinDeployment { address: "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU", decimals: 6 })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stablecoin_known_chain() {
        let usdc = default_stablecoin("5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp").unwrap();
        assert_eq!(usdc.decimals, 6);
    }

    #[test]
    fn test_chain_reference_resolves_caip2_and_alias() {
        assert_eq!(
            chain_reference("solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp").as_deref(),
            Some("5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp")
        );
        assert_eq!(chain_reference("solana-devnet").as_deref(), Some("EtWTRABZaYq6iMfeYKouRu166VU2xqa1"));
        assert!(chain_reference("unknown-alias").is_none());
    }

    #[test]
    fn test_default_stablecoin_unknown_chain() {
        assert!(default_stablecoin("unknown").is_none());
    }
}
