//! Client-side EIP-712 signing for the ERC-3009 `exact` scheme.

use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, FixedBytes, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolStruct, eip712_domain};
use rand::Rng;
use x402_core::hooks::{BoxFuture, RequirementsView};
use x402_core::scheme::{ClientScheme, SchemeError};

use crate::chain_reference;
use crate::exact::types::{Eip3009Authorization, Eip3009Payload, PaymentRequirementsExtra, TransferWithAuthorization};

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

/// `ClientScheme` that signs ERC-3009 `transferWithAuthorization` using a
/// single local signer.
#[derive(Debug, Clone)]
pub struct Eip155ExactClient {
    signer: PrivateKeySigner,
}

impl Eip155ExactClient {
    /// Builds a client scheme from a local signer.
    #[must_use]
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    async fn sign(&self, requirements: &RequirementsView) -> Result<serde_json::Value, SchemeError> {
        let chain_reference = chain_reference(&requirements.network())
            .ok_or_else(|| format!("unresolvable eip155 network: {}", requirements.network()))?;
        let chain_id: u64 = chain_reference.parse().map_err(|_| format!("non-numeric eip155 reference: {chain_reference}"))?;

        let to: Address = requirements.pay_to().parse().map_err(|e| format!("invalid payTo address: {e}"))?;
        let asset: Address = requirements.asset().parse().map_err(|e| format!("invalid asset address: {e}"))?;
        let value: U256 = requirements.amount().parse().map_err(|e| format!("invalid amount: {e}"))?;

        let (name, version) = requirements
            .extra()
            .and_then(|extra| serde_json::from_value::<PaymentRequirementsExtra>(extra.clone()).ok())
            .map_or_else(|| (String::new(), String::new()), |extra| (extra.name, extra.version));

        let domain = eip712_domain! {
            name: name,
            version: version,
            chain_id: chain_id,
            verifying_contract: asset,
        };

        let now = now_secs();
        let valid_after = now.saturating_sub(600);
        let valid_before = now + requirements.max_timeout_seconds();
        let nonce = FixedBytes(rand::rng().random::<[u8; 32]>());

        let authorization = Eip3009Authorization {
            from: self.signer.address(),
            to,
            value,
            valid_after,
            valid_before,
            nonce,
        };

        let typed = TransferWithAuthorization {
            from: authorization.from,
            to: authorization.to,
            value: authorization.value,
            validAfter: U256::from(authorization.valid_after),
            validBefore: U256::from(authorization.valid_before),
            nonce: authorization.nonce,
        };

        let hash = typed.eip712_signing_hash(&domain);
        let signature = self.signer.sign_hash(&hash).await.map_err(|e| format!("signing failed: {e}"))?;

        let payload = Eip3009Payload {
            signature: format!("0x{}", alloy_primitives::hex::encode(signature.as_bytes())),
            authorization,
        };
        serde_json::to_value(payload).map_err(Into::into)
    }
}

impl ClientScheme for Eip155ExactClient {
    fn scheme(&self) -> &str {
        super::SCHEME
    }

    fn create_payment_payload<'a>(
        &'a self,
        requirements: &'a RequirementsView,
    ) -> BoxFuture<'a, Result<serde_json::Value, SchemeError>> {
        Box::pin(self.sign(requirements))
    }
}
