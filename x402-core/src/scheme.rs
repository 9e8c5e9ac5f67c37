//! The three mechanism-role traits every concrete scheme (EVM-exact,
//! SVM-exact, ...) implements against. Not every scheme ships all three —
//! a facilitator-only adapter need not provide a `ClientScheme`.

use crate::amount::AssetAmount;
use crate::chain::ChainId;
use crate::hooks::{BoxFuture, PayloadView, RequirementsView};
use crate::proto::{SettleResponse, SupportedKind, VerifyResponse, v2};

/// Boxed error type returned by scheme mechanism calls. Schemes own their
/// failure modes (RPC errors, signing errors, simulation failures); this
/// crate only needs `Display` + `Error` to log and to build
/// `PaymentCreationFailureContext`/`VerifyFailureContext` strings.
pub type SchemeError = Box<dyn std::error::Error + Send + Sync>;

/// A price as given to `ServerScheme::parse_price`: a fiat string, a raw
/// numeric amount, or an already-resolved asset amount.
#[derive(Debug, Clone)]
pub enum PriceInput {
    /// A `"$0.001"`-style fiat string.
    Money(String),
    /// A raw numeric amount, unit implied by context.
    Number(f64),
    /// An amount already resolved to a specific asset.
    Asset(AssetAmount),
}

impl From<&str> for PriceInput {
    fn from(value: &str) -> Self {
        Self::Money(value.to_string())
    }
}

impl From<AssetAmount> for PriceInput {
    fn from(value: AssetAmount) -> Self {
        Self::Asset(value)
    }
}

/// The client half of a scheme: builds the signed, scheme-specific
/// authorization that becomes `PaymentPayload.payload`.
pub trait ClientScheme: Send + Sync {
    /// The scheme identifier (e.g. `"exact"`).
    fn scheme(&self) -> &str;

    /// Builds the scheme-specific signed authorization for `requirements`.
    fn create_payment_payload<'a>(
        &'a self,
        requirements: &'a RequirementsView,
    ) -> BoxFuture<'a, Result<serde_json::Value, SchemeError>>;
}

/// The server half of a scheme: prices a resource and enriches the
/// requirement a client will sign against.
pub trait ServerScheme: Send + Sync {
    /// The scheme identifier.
    fn scheme(&self) -> &str;

    /// Resolves `price` (fiat string, number, or pre-resolved asset amount)
    /// to a concrete atomic-unit amount and asset on `network`.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemeError`] if `price` cannot be resolved for `network`.
    fn parse_price(&self, price: &PriceInput, network: &ChainId) -> Result<AssetAmount, SchemeError>;

    /// Mutates `requirements.extra` with scheme-specific fields a client
    /// needs in order to sign (EIP-712 domain, fee payer, ...). Default is a
    /// passthrough.
    fn enhance_requirements(
        &self,
        requirements: v2::PaymentRequirements,
        _supported: &SupportedKind,
    ) -> v2::PaymentRequirements {
        requirements
    }
}

/// The facilitator half of a scheme: verifies and settles payloads on-chain.
pub trait FacilitatorScheme: Send + Sync {
    /// The scheme identifier.
    fn scheme(&self) -> &str;

    /// The CAIP-2 namespace this mechanism services (e.g. `"eip155"`).
    fn caip_family(&self) -> &str;

    /// Scheme-specific validity checks against `requirements`.
    fn verify<'a>(
        &'a self,
        payload: &'a PayloadView,
        requirements: &'a RequirementsView,
    ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>>;

    /// Broadcasts the authorization and awaits confirmation.
    fn settle<'a>(
        &'a self,
        payload: &'a PayloadView,
        requirements: &'a RequirementsView,
    ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>>;

    /// Scheme-specific metadata surfaced in `SupportedResponse.kinds[].extra`.
    fn get_extra(&self, _network: &ChainId) -> Option<serde_json::Value> {
        None
    }

    /// Facilitator-controlled signer addresses for `network`.
    fn get_signers(&self, _network: &ChainId) -> Vec<String> {
        Vec::new()
    }
}
