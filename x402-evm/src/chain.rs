//! EVM chain provider wrapper used by the `exact` scheme's facilitator half.
//!
//! Grounded on `r402-evm::chain::provider::Eip155ChainProvider`: a fillered
//! `alloy` [`Provider`] with wallet signing for settlement transactions,
//! trimmed down to a single signer (the teacher's round-robin multi-signer
//! pool is not required by this workspace's scope).

#[cfg(feature = "facilitator")]
pub use facilitator::*;

#[cfg(feature = "facilitator")]
mod facilitator {
    use alloy_network::EthereumWallet;
    use alloy_primitives::Address;
    use alloy_provider::fillers::{ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller};
    use alloy_provider::{Identity, ProviderBuilder, RootProvider};
    use alloy_signer_local::PrivateKeySigner;
    use alloy_transport::TransportError;
    use url::Url;

    /// Combined filler stack: gas estimation, nonce management, chain id, wallet signing.
    pub type InnerFiller = JoinFill<GasFiller, JoinFill<NonceFiller, ChainIdFiller>>;

    /// The fully composed provider type used to submit settlement transactions.
    pub type InnerProvider =
        FillProvider<JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>, RootProvider>;

    /// Facilitator-side RPC provider for one EVM chain.
    ///
    /// Wraps a signer-backed `alloy` provider and exposes the small surface
    /// `exact::facilitator` needs: `eth_call`s for balance/nonce checks, and
    /// transaction submission with receipt awaiting.
    #[derive(Debug, Clone)]
    pub struct Eip155Provider {
        chain_id: u64,
        inner: InnerProvider,
        signer_address: Address,
        receipt_timeout_secs: u64,
    }

    impl Eip155Provider {
        /// Builds a provider for `chain_id` against `rpc_url`, signing
        /// settlement transactions with `signer`.
        ///
        /// # Errors
        ///
        /// Returns a [`TransportError`] if the RPC endpoint cannot be reached.
        pub async fn connect(
            chain_id: u64,
            rpc_url: &Url,
            signer: PrivateKeySigner,
            receipt_timeout_secs: u64,
        ) -> Result<Self, TransportError> {
            let signer_address = signer.address();
            let wallet = EthereumWallet::from(signer);
            let inner = ProviderBuilder::new()
                .with_gas_estimation()
                .with_nonce_management(NonceFiller::default())
                .with_chain_id(chain_id)
                .wallet(wallet)
                .connect_http(rpc_url.clone());
            Ok(Self { chain_id, inner, signer_address, receipt_timeout_secs })
        }

        /// The numeric EIP-155 chain id this provider targets.
        #[must_use]
        pub const fn chain_id(&self) -> u64 {
            self.chain_id
        }

        /// The facilitator's signing/fee-paying address on this chain.
        #[must_use]
        pub const fn signer_address(&self) -> Address {
            self.signer_address
        }

        /// The underlying `alloy` provider, for direct contract calls.
        #[must_use]
        pub const fn inner(&self) -> &InnerProvider {
            &self.inner
        }

        /// Timeout, in seconds, callers should apply to
        /// `PendingTransactionBuilder::with_timeout` when awaiting a
        /// settlement receipt.
        #[must_use]
        pub const fn receipt_timeout_secs(&self) -> u64 {
            self.receipt_timeout_secs
        }
    }
}
