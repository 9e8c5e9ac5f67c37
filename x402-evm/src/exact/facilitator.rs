//! Facilitator-side verification and settlement for the ERC-3009 `exact` scheme.

use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, U256};
use alloy_sol_types::{SolStruct, eip712_domain};
use x402_core::chain::ChainId;
use x402_core::hooks::{BoxFuture, PayloadView, RequirementsView};
use x402_core::proto::{PaymentVerificationError, SettleResponse, VerifyResponse};
use x402_core::scheme::{FacilitatorScheme, SchemeError};

use crate::chain::Eip155Provider;
use crate::chain_reference;
use crate::exact::types::{Eip3009Payload, IEip3009Token, TransferWithAuthorization};

#[cfg(feature = "telemetry")]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => { tracing::$level!($($arg)*) };
}
#[cfg(not(feature = "telemetry"))]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => {{}};
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

/// Seconds of grace applied to `validAfter`/`validBefore` checks to tolerate
/// clock drift between the facilitator and whichever clock the client used.
const CLOCK_SKEW_TOLERANCE_SECS: u64 = 6;

/// `FacilitatorScheme` for ERC-3009 `transferWithAuthorization` payments.
///
/// Holds one [`Eip155Provider`] per chain this facilitator services, each
/// capable of both `eth_call` reads (nonce/balance checks) and signed
/// transaction submission (settlement).
#[derive(Debug, Clone)]
pub struct Eip155ExactFacilitator {
    providers: Vec<(u64, Eip155Provider)>,
}

impl Eip155ExactFacilitator {
    /// Builds a facilitator scheme from its chain providers.
    #[must_use]
    pub fn new(providers: Vec<(u64, Eip155Provider)>) -> Self {
        Self { providers }
    }

    fn provider_for(&self, chain_id: u64) -> Option<&Eip155Provider> {
        self.providers.iter().find(|(id, _)| *id == chain_id).map(|(_, provider)| provider)
    }

    fn chain_id_of(&self, requirements: &RequirementsView) -> Result<u64, VerifyResponse> {
        chain_reference(&requirements.network())
            .and_then(|reference| reference.parse().ok())
            .ok_or_else(|| PaymentVerificationError::UnsupportedChain.into())
    }

    async fn do_verify(&self, payload: &PayloadView, requirements: &RequirementsView) -> Result<VerifyResponse, SchemeError> {
        let eip3009: Eip3009Payload = match payload {
            PayloadView::V2(payload) => serde_json::from_value(payload.payload.clone())?,
            PayloadView::V1(payload) => serde_json::from_value(payload.payload.clone())?,
        };

        let chain_id = match self.chain_id_of(requirements) {
            Ok(chain_id) => chain_id,
            Err(response) => return Ok(response),
        };
        let Some(provider) = self.provider_for(chain_id) else {
            return Ok(PaymentVerificationError::UnsupportedChain.into());
        };

        let authorization = eip3009.authorization;
        let now = now_secs();
        if authorization.valid_before < now + CLOCK_SKEW_TOLERANCE_SECS {
            return Ok(PaymentVerificationError::Expired.into());
        }
        if authorization.valid_after > now + CLOCK_SKEW_TOLERANCE_SECS {
            return Ok(PaymentVerificationError::Early.into());
        }

        let Ok(pay_to) = requirements.pay_to().parse::<Address>() else {
            return Ok(PaymentVerificationError::InvalidFormat("payTo is not a valid address".into()).into());
        };
        if authorization.to != pay_to {
            return Ok(PaymentVerificationError::RecipientMismatch.into());
        }

        let Ok(required_amount) = requirements.amount().parse::<U256>() else {
            return Ok(PaymentVerificationError::InvalidFormat("amount is not a valid integer".into()).into());
        };
        if authorization.value < required_amount {
            return Ok(PaymentVerificationError::InvalidPaymentAmount.into());
        }

        let Ok(asset_address) = requirements.asset().parse::<Address>() else {
            return Ok(PaymentVerificationError::InvalidFormat("asset is not a valid address".into()).into());
        };
        let contract = IEip3009Token::new(asset_address, provider.inner().clone());

        let name = contract.name().call().await?;
        let version = contract.version().call().await?;
        let domain = eip712_domain! {
            name: name,
            version: version,
            chain_id: chain_id,
            verifying_contract: asset_address,
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
        let signature_bytes = alloy_primitives::hex::decode(eip3009.signature.trim_start_matches("0x"))?;
        let signature = alloy_primitives::Signature::from_raw(&signature_bytes)?;
        let Ok(recovered) = signature.recover_address_from_prehash(&hash) else {
            return Ok(PaymentVerificationError::InvalidSignature("signature recovery failed".into()).into());
        };
        if recovered != authorization.from {
            return Ok(PaymentVerificationError::InvalidSignature("recovered signer does not match authorization.from".into()).into());
        }

        let already_used = contract.authorizationState(authorization.from, authorization.nonce).call().await?;
        if already_used {
            return Ok(PaymentVerificationError::NonceAlreadyUsed.into());
        }
        let balance = contract.balanceOf(authorization.from).call().await?;
        if balance < authorization.value {
            return Ok(PaymentVerificationError::InsufficientFunds.into());
        }

        Ok(VerifyResponse::Valid { payer: authorization.from.to_string() })
    }

    async fn do_settle(&self, payload: &PayloadView, requirements: &RequirementsView) -> Result<SettleResponse, SchemeError> {
        let network = ChainId::new("eip155", chain_reference(&requirements.network()).unwrap_or_default());
        let eip3009: Eip3009Payload = match payload {
            PayloadView::V2(payload) => serde_json::from_value(payload.payload.clone())?,
            PayloadView::V1(payload) => serde_json::from_value(payload.payload.clone())?,
        };
        let chain_id = match self.chain_id_of(requirements) {
            Ok(chain_id) => chain_id,
            Err(_) => return Ok(SettleResponse::Error { error_reason: "invalid_network".into(), network }),
        };
        let Some(provider) = self.provider_for(chain_id) else {
            return Ok(SettleResponse::Error { error_reason: "invalid_network".into(), network });
        };
        let Ok(asset_address) = requirements.asset().parse::<Address>() else {
            return Ok(SettleResponse::Error { error_reason: "invalid_format".into(), network });
        };
        let contract = IEip3009Token::new(asset_address, provider.inner().clone());
        let authorization = eip3009.authorization;
        let Ok(signature_bytes) = alloy_primitives::hex::decode(eip3009.signature.trim_start_matches("0x")) else {
            return Ok(SettleResponse::Error { error_reason: "invalid_signature".into(), network });
        };

        let call = contract.transferWithAuthorization(
            authorization.from,
            authorization.to,
            authorization.value,
            U256::from(authorization.valid_after),
            U256::from(authorization.valid_before),
            authorization.nonce,
            signature_bytes.into(),
        );
        let pending = match call.send().await {
            Ok(pending) => pending,
            Err(error) => {
                traced!(warn, %error, %chain_id, "transferWithAuthorization submission failed");
                return Ok(SettleResponse::Error { error_reason: format!("transaction_simulation_failed: {error}"), network });
            }
        };
        let timeout = std::time::Duration::from_secs(provider.receipt_timeout_secs());
        let receipt = match pending.with_timeout(Some(timeout)).get_receipt().await {
            Ok(receipt) => receipt,
            Err(error) => {
                traced!(warn, %error, %chain_id, "transferWithAuthorization receipt wait failed");
                return Ok(SettleResponse::Error { error_reason: format!("transaction_simulation_failed: {error}"), network });
            }
        };

        traced!(info, tx_hash = %receipt.transaction_hash, %chain_id, "settled eip3009 transfer");
        Ok(SettleResponse::Success {
            payer: authorization.from.to_string(),
            transaction: receipt.transaction_hash.to_string(),
            network,
        })
    }
}

impl FacilitatorScheme for Eip155ExactFacilitator {
    fn scheme(&self) -> &str {
        super::SCHEME
    }

    fn caip_family(&self) -> &str {
        "eip155"
    }

    fn verify<'a>(
        &'a self,
        payload: &'a PayloadView,
        requirements: &'a RequirementsView,
    ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
        Box::pin(self.do_verify(payload, requirements))
    }

    fn settle<'a>(
        &'a self,
        payload: &'a PayloadView,
        requirements: &'a RequirementsView,
    ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
        Box::pin(self.do_settle(payload, requirements))
    }

    fn get_signers(&self, network: &ChainId) -> Vec<String> {
        chain_reference(&network.to_string())
            .and_then(|reference| reference.parse::<u64>().ok())
            .and_then(|chain_id| self.provider_for(chain_id))
            .map(|provider| vec![provider.signer_address().to_string()])
            .unwrap_or_default()
    }
}
