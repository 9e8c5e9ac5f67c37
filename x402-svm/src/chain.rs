//! Solana RPC connection wrapper shared by the client and facilitator
//! halves of the `exact` scheme.

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_pubkey::Pubkey;
use url::Url;

/// A connection to a single Solana cluster, plus the compute-budget caps a
/// facilitator is willing to sponsor.
///
/// Grounded on the teacher's `SolanaChainProvider`, trimmed to a single
/// fixed compute-unit budget instead of simulation-based estimation (see
/// `DESIGN.md`).
#[derive(Debug, Clone)]
pub struct SvmConnection {
    chain_reference: String,
    rpc: std::sync::Arc<RpcClient>,
    max_compute_unit_limit: u32,
    max_compute_unit_price: u64,
}

impl SvmConnection {
    /// Connects to a Solana cluster at `rpc_url`.
    #[must_use]
    pub fn connect(chain_reference: impl Into<String>, rpc_url: &Url) -> Self {
        let rpc = RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed());
        Self {
            chain_reference: chain_reference.into(),
            rpc: std::sync::Arc::new(rpc),
            max_compute_unit_limit: 200_000,
            max_compute_unit_price: 1_000_000,
        }
    }

    /// Overrides the default compute-unit limit/price caps.
    #[must_use]
    pub const fn with_compute_budget(mut self, max_compute_unit_limit: u32, max_compute_unit_price: u64) -> Self {
        self.max_compute_unit_limit = max_compute_unit_limit;
        self.max_compute_unit_price = max_compute_unit_price;
        self
    }

    /// The bare `solana` chain reference (genesis-hash prefix) this
    /// connection services.
    #[must_use]
    pub fn chain_reference(&self) -> &str {
        &self.chain_reference
    }

    /// The underlying RPC client.
    #[must_use]
    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    #[must_use]
    pub const fn max_compute_unit_limit(&self) -> u32 {
        self.max_compute_unit_limit
    }

    #[must_use]
    pub const fn max_compute_unit_price(&self) -> u64 {
        self.max_compute_unit_price
    }
}

/// Derives a token account's associated-token-account address.
#[must_use]
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address_with_program_id(owner, mint, token_program)
}
