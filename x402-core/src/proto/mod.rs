//! Wire types shared between protocol versions, plus the version-specific
//! [`v1`] and [`v2`] submodules.

pub mod v1;
pub mod v2;
pub mod version;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::chain::ChainId;

/// Extension-keyed declaration/info map, as carried in `PaymentRequired.extensions`
/// and `PaymentPayload.extensions`.
pub type Extensions = HashMap<String, serde_json::Value>;

/// One (version, scheme, network) combination a facilitator can service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    /// Protocol version this kind applies to.
    pub x402_version: u8,
    /// Payment construction style.
    pub scheme: String,
    /// CAIP-2 network identifier (exact; wildcards are not enumerated here).
    pub network: ChainId,
    /// Scheme-specific metadata (`FacilitatorScheme::get_extra`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// A facilitator's full capability advertisement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// Every (version, scheme, network) combination supported.
    pub kinds: Vec<SupportedKind>,
    /// Names of supported extensions.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Facilitator-controlled signer addresses, keyed by CAIP-2 network
    /// string (or `"{namespace}:*"` for a family-wide pool).
    #[serde(default)]
    pub signers: HashMap<String, Vec<String>>,
}

impl SupportedResponse {
    /// Looks up signer addresses for `network`, checking the exact network
    /// key first and falling back to the `{namespace}:*` wildcard key.
    #[must_use]
    pub fn signers_for_chain(&self, network: &ChainId) -> Option<&[String]> {
        self.signers
            .get(&network.to_string())
            .or_else(|| self.signers.get(&format!("{}:*", network.namespace())))
            .map(Vec::as_slice)
    }
}

/// Result of a `FacilitatorScheme::verify` / `Facilitator::verify` call.
///
/// Serializes to the flat wire shape `{isValid, payer?, invalidReason?,
/// message?}` via a private [`VerifyResponseWire`] intermediate, so API
/// consumers see the literal protocol JSON rather than a tagged union.
#[derive(Debug, Clone)]
pub enum VerifyResponse {
    /// The payload is valid; `payer` identifies who will be charged.
    Valid {
        /// Payer identifier recovered from the authorization.
        payer: String,
    },
    /// The payload failed verification.
    Invalid {
        /// Stable machine-readable reason code (e.g. `"invalid_signature"`).
        invalid_reason: String,
        /// Human-readable detail, debugging only.
        message: Option<String>,
        /// Payer identifier, if one could still be recovered.
        payer: Option<String>,
    },
}

impl VerifyResponse {
    /// Whether this result represents a valid payment.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// The payer identifier, if the response carries one.
    #[must_use]
    pub fn payer(&self) -> Option<&str> {
        match self {
            Self::Valid { payer } => Some(payer),
            Self::Invalid { payer, .. } => payer.as_deref(),
        }
    }

    /// Builds an invalid result with only a reason code.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            invalid_reason: reason.into(),
            message: None,
            payer: None,
        }
    }
}

/// Private flat wire representation of [`VerifyResponse`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl Serialize for VerifyResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                payer: Some(payer.clone()),
                invalid_reason: None,
                message: None,
            },
            Self::Invalid { invalid_reason, message, payer } => VerifyResponseWire {
                is_valid: false,
                payer: payer.clone(),
                invalid_reason: Some(invalid_reason.clone()),
                message: message.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        Ok(if wire.is_valid {
            Self::Valid {
                payer: wire.payer.unwrap_or_default(),
            }
        } else {
            Self::Invalid {
                invalid_reason: wire.invalid_reason.unwrap_or_else(|| "unknown".to_string()),
                message: wire.message,
                payer: wire.payer,
            }
        })
    }
}

/// Result of a `FacilitatorScheme::settle` / `Facilitator::settle` call.
///
/// Serializes to the flat wire shape `{success, transaction?, network?,
/// payer?, errorReason?}` via a private [`SettleResponseWire`] intermediate.
#[derive(Debug, Clone)]
pub enum SettleResponse {
    /// Settlement broadcast and confirmed.
    Success {
        /// Payer identifier.
        payer: String,
        /// On-chain transaction identifier.
        transaction: String,
        /// Network the transaction was broadcast to.
        network: ChainId,
    },
    /// Settlement failed.
    Error {
        /// Stable machine-readable reason code.
        error_reason: String,
        /// Network the attempt targeted.
        network: ChainId,
    },
}

impl SettleResponse {
    /// Whether settlement succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The network this response pertains to.
    #[must_use]
    pub fn network(&self) -> &ChainId {
        match self {
            Self::Success { network, .. } | Self::Error { network, .. } => network,
        }
    }
}

/// Private flat wire representation of [`SettleResponse`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    network: Option<ChainId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<String>,
}

impl Serialize for SettleResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Success { payer, transaction, network } => SettleResponseWire {
                success: true,
                transaction: Some(transaction.clone()),
                network: Some(network.clone()),
                payer: Some(payer.clone()),
                error_reason: None,
            },
            Self::Error { error_reason, network } => SettleResponseWire {
                success: false,
                transaction: None,
                network: Some(network.clone()),
                payer: None,
                error_reason: Some(error_reason.clone()),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        let network = wire.network.ok_or_else(|| serde::de::Error::missing_field("network"))?;
        Ok(if wire.success {
            Self::Success {
                payer: wire.payer.unwrap_or_default(),
                transaction: wire.transaction.unwrap_or_default(),
                network,
            }
        } else {
            Self::Error {
                error_reason: wire.error_reason.unwrap_or_else(|| "unknown".to_string()),
                network,
            }
        })
    }
}

/// Stable, machine-handleable verification failure reasons.
///
/// `#[non_exhaustive]` because mechanisms may introduce scheme-specific
/// reasons beyond this common set.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum PaymentVerificationError {
    /// The payload did not match the expected shape for this scheme.
    #[error("invalid payload format: {0}")]
    InvalidFormat(String),
    /// The signed amount is less than the required amount.
    #[error("insufficient payment amount")]
    InvalidPaymentAmount,
    /// The authorization is not yet valid (`validAfter` in the future).
    #[error("authorization not yet valid")]
    Early,
    /// The authorization has expired (`validBefore` in the past).
    #[error("authorization expired")]
    Expired,
    /// `requirements.network` does not match the authorization's chain.
    #[error("chain id mismatch")]
    ChainIdMismatch,
    /// The authorization's recipient does not match `requirements.pay_to`.
    #[error("recipient mismatch")]
    RecipientMismatch,
    /// The authorization's asset does not match `requirements.asset`.
    #[error("asset mismatch")]
    AssetMismatch,
    /// The payer does not hold sufficient balance.
    #[error("insufficient funds")]
    InsufficientFunds,
    /// Signature verification failed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// On-chain simulation of the settlement failed.
    #[error("transaction simulation failed: {0}")]
    TransactionSimulation(String),
    /// No mechanism is registered for the requested network.
    #[error("unsupported chain")]
    UnsupportedChain,
    /// No mechanism is registered for the requested scheme.
    #[error("unsupported scheme")]
    UnsupportedScheme,
    /// `payload.accepted` does not match any of the server's offered requirements.
    #[error("accepted requirements do not match any offered option")]
    AcceptedRequirementsMismatch,
    /// The authorization's nonce has already been consumed on-chain.
    #[error("nonce already used")]
    NonceAlreadyUsed,
}

impl PaymentVerificationError {
    /// Stable snake_case reason code, for `VerifyResponse::Invalid.invalid_reason`.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidFormat(_) => "invalid_format",
            Self::InvalidPaymentAmount => "insufficient_amount",
            Self::Early => "authorization_not_yet_valid",
            Self::Expired => "authorization_expired",
            Self::ChainIdMismatch => "chain_id_mismatch",
            Self::RecipientMismatch => "destination_mismatch",
            Self::AssetMismatch => "token_mismatch",
            Self::InsufficientFunds => "insufficient_funds",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::TransactionSimulation(_) => "transaction_simulation_failed",
            Self::UnsupportedChain => "invalid_network",
            Self::UnsupportedScheme => "scheme_not_found",
            Self::AcceptedRequirementsMismatch => "accepted_requirements_mismatch",
            Self::NonceAlreadyUsed => "nonce_already_used",
        }
    }
}

impl From<PaymentVerificationError> for VerifyResponse {
    fn from(error: PaymentVerificationError) -> Self {
        Self::Invalid {
            invalid_reason: error.reason_code().to_string(),
            message: Some(error.to_string()),
            payer: None,
        }
    }
}

/// Either version's `PaymentRequired`, used where a caller genuinely needs to
/// be version-agnostic (hook contexts, HTTP header decoding).
#[derive(Debug, Clone)]
pub enum PaymentRequired {
    /// Version 1.
    V1(v1::PaymentRequired),
    /// Version 2.
    V2(v2::PaymentRequired),
}

impl PaymentRequired {
    /// The protocol version this value carries.
    #[must_use]
    pub fn version(&self) -> u8 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }
}

/// Either version's `PaymentPayload`.
#[derive(Debug, Clone)]
pub enum PaymentPayload {
    /// Version 1.
    V1(v1::PaymentPayload),
    /// Version 2.
    V2(Box<v2::PaymentPayload>),
}

impl PaymentPayload {
    /// The protocol version this value carries.
    #[must_use]
    pub fn version(&self) -> u8 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_response_valid_is_valid() {
        let response = VerifyResponse::Valid { payer: "0xabc".into() };
        assert!(response.is_valid());
        assert_eq!(response.payer(), Some("0xabc"));
    }

    #[test]
    fn test_verify_response_invalid_roundtrip() {
        let response = VerifyResponse::invalid("invalid_signature");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["invalidReason"], "invalid_signature");
        let back: VerifyResponse = serde_json::from_value(json).unwrap();
        assert!(!back.is_valid());
    }

    #[test]
    fn test_settle_response_success_network() {
        let response = SettleResponse::Success {
            payer: "0xabc".into(),
            transaction: "0xdeadbeef".into(),
            network: ChainId::new("eip155", "8453"),
        };
        assert!(response.is_success());
        assert_eq!(response.network(), &ChainId::new("eip155", "8453"));
    }

    #[test]
    fn test_payment_verification_error_reason_codes_are_stable() {
        assert_eq!(PaymentVerificationError::InvalidPaymentAmount.reason_code(), "insufficient_amount");
        assert_eq!(PaymentVerificationError::NonceAlreadyUsed.reason_code(), "nonce_already_used");
    }

    #[test]
    fn test_supported_response_signers_wildcard_fallback() {
        let mut signers = HashMap::new();
        signers.insert("eip155:*".to_string(), vec!["0xfee".to_string()]);
        let response = SupportedResponse { signers, ..Default::default() };
        let found = response.signers_for_chain(&ChainId::new("eip155", "8453")).unwrap();
        assert_eq!(found, ["0xfee".to_string()]);
    }
}
