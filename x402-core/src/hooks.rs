//! Hook pipeline machinery shared by [`crate::client::Client`],
//! [`crate::server::ResourceServer`], and [`crate::facilitator::Facilitator`].
//!
//! Every stage is modeled the same way: an ordered `Vec` of boxed async
//! closures, each given a `&Context` and returning `Option<Outcome>`. `None`
//! means "continue"; `Some` means "abort" (before-hooks) or "recover"
//! (failure-hooks). After-hooks return nothing meaningful — their errors are
//! logged and swallowed, never propagated.

use std::future::Future;
use std::pin::Pin;

use crate::proto::{self, v1, v2};

/// A boxed, `Send`, dyn-compatible future — the shape every hook closure
/// returns, since `async fn` in a trait object is not directly expressible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of an aborted before-hook.
#[derive(Debug, Clone)]
pub struct AbortResult {
    /// Why the hook chose to abort.
    pub reason: String,
}

impl AbortResult {
    /// Builds an `AbortResult` with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// A payload substituted by a payment-creation failure-recovery hook.
#[derive(Debug, Clone)]
pub struct RecoveredPayloadResult {
    /// The substitute payload.
    pub payload: proto::PaymentPayload,
}

/// A verify result substituted by a verify-failure recovery hook.
#[derive(Debug, Clone)]
pub struct RecoveredVerifyResult {
    /// The substitute result.
    pub result: proto::VerifyResponse,
}

/// A settle result substituted by a settle-failure recovery hook.
#[derive(Debug, Clone)]
pub struct RecoveredSettleResult {
    /// The substitute result.
    pub result: proto::SettleResponse,
}

/// Read-only view over either protocol version's `PaymentRequirements`, for
/// hook code that only needs the common accessors.
#[derive(Debug, Clone)]
pub enum RequirementsView {
    /// Version 1.
    V1(v1::PaymentRequirements),
    /// Version 2.
    V2(v2::PaymentRequirements),
}

impl RequirementsView {
    /// The payment construction style.
    #[must_use]
    pub fn scheme(&self) -> &str {
        match self {
            Self::V1(r) => &r.scheme,
            Self::V2(r) => &r.scheme,
        }
    }

    /// The atomic-unit amount string.
    #[must_use]
    pub fn amount(&self) -> &str {
        match self {
            Self::V1(r) => &r.amount,
            Self::V2(r) => &r.amount,
        }
    }

    /// The network identifier as a display string (CAIP-2 for v2, legacy
    /// alias for v1).
    #[must_use]
    pub fn network(&self) -> String {
        match self {
            Self::V1(r) => r.network.clone(),
            Self::V2(r) => r.network.to_string(),
        }
    }

    /// The recipient identifier.
    #[must_use]
    pub fn pay_to(&self) -> &str {
        match self {
            Self::V1(r) => &r.pay_to,
            Self::V2(r) => &r.pay_to,
        }
    }

    /// The scheme-specific asset identifier.
    #[must_use]
    pub fn asset(&self) -> &str {
        match self {
            Self::V1(r) => &r.asset,
            Self::V2(r) => &r.asset,
        }
    }

    /// Seconds after which a created payload for this requirement is stale.
    #[must_use]
    pub fn max_timeout_seconds(&self) -> u64 {
        match self {
            Self::V1(r) => r.max_timeout_seconds,
            Self::V2(r) => r.max_timeout_seconds,
        }
    }

    /// Scheme-specific extra metadata (EIP-712 domain, fee payer, ...).
    #[must_use]
    pub fn extra(&self) -> Option<&serde_json::Value> {
        match self {
            Self::V1(r) => r.extra.as_ref(),
            Self::V2(r) => r.extra.as_ref(),
        }
    }
}

/// Read-only view over either protocol version's `PaymentRequired`.
#[derive(Debug, Clone)]
pub enum PaymentRequiredView {
    /// Version 1.
    V1(v1::PaymentRequired),
    /// Version 2.
    V2(v2::PaymentRequired),
}

impl PaymentRequiredView {
    /// The protocol version.
    #[must_use]
    pub fn version(&self) -> u8 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }
}

/// Read-only view over either protocol version's `PaymentPayload`.
#[derive(Debug, Clone)]
pub enum PayloadView {
    /// Version 1.
    V1(v1::PaymentPayload),
    /// Version 2.
    V2(Box<v2::PaymentPayload>),
}

/// Context given to `Client` before-payment-creation hooks.
#[derive(Debug, Clone)]
pub struct PaymentCreationContext {
    /// The server's `PaymentRequired` response being responded to.
    pub payment_required: PaymentRequiredView,
    /// The requirement the selector chose.
    pub selected_requirements: RequirementsView,
}

/// Context given to `Client` after-payment-creation hooks.
#[derive(Debug, Clone)]
pub struct PaymentCreatedContext {
    /// The requirement that was selected.
    pub selected_requirements: RequirementsView,
    /// The payload the mechanism produced.
    pub payment_payload: PayloadView,
}

/// Context given to `Client` payment-creation-failure hooks.
#[derive(Debug, Clone)]
pub struct PaymentCreationFailureContext {
    /// The requirement that was selected when the mechanism call failed.
    pub selected_requirements: RequirementsView,
    /// Stringified error from the mechanism.
    pub error: String,
}

/// Context given to verify hooks (`ResourceServer` and `Facilitator`).
#[derive(Debug, Clone)]
pub struct VerifyContext {
    /// The payload under verification.
    pub payload: PayloadView,
    /// The requirement it is being checked against.
    pub requirements: RequirementsView,
}

/// Context given to after-verify hooks.
#[derive(Debug, Clone)]
pub struct VerifyResultContext {
    /// The payload that was verified.
    pub payload: PayloadView,
    /// The requirement it was checked against.
    pub requirements: RequirementsView,
    /// The verification result.
    pub result: proto::VerifyResponse,
}

/// Context given to verify-failure hooks.
#[derive(Debug, Clone)]
pub struct VerifyFailureContext {
    /// The payload that failed verification.
    pub payload: PayloadView,
    /// The requirement it was checked against.
    pub requirements: RequirementsView,
    /// Stringified error, or the stable reason code for a structural `!isValid`.
    pub error: String,
}

/// Context given to settle hooks.
#[derive(Debug, Clone)]
pub struct SettleContext {
    /// The payload being settled.
    pub payload: PayloadView,
    /// The requirement it is being settled against.
    pub requirements: RequirementsView,
}

/// Context given to after-settle hooks.
#[derive(Debug, Clone)]
pub struct SettleResultContext {
    /// The payload that was settled.
    pub payload: PayloadView,
    /// The requirement it was settled against.
    pub requirements: RequirementsView,
    /// The settlement result.
    pub result: proto::SettleResponse,
}

/// Context given to settle-failure hooks.
#[derive(Debug, Clone)]
pub struct SettleFailureContext {
    /// The payload that failed to settle.
    pub payload: PayloadView,
    /// The requirement it was settled against.
    pub requirements: RequirementsView,
    /// Stringified error, or the stable reason code for a structural failure.
    pub error: String,
}

/// Before-payment-creation hook: may abort the operation.
pub type BeforePaymentCreationHook =
    Box<dyn Fn(&PaymentCreationContext) -> BoxFuture<'_, Option<AbortResult>> + Send + Sync>;
/// After-payment-creation hook: errors are logged and swallowed.
pub type AfterPaymentCreationHook = Box<dyn Fn(&PaymentCreatedContext) -> BoxFuture<'_, ()> + Send + Sync>;
/// Payment-creation-failure hook: may recover with a substitute payload.
pub type PaymentCreationFailureHook = Box<
    dyn Fn(&PaymentCreationFailureContext) -> BoxFuture<'_, Option<RecoveredPayloadResult>> + Send + Sync,
>;

/// Before-verify hook: may abort the operation.
pub type BeforeVerifyHook = Box<dyn Fn(&VerifyContext) -> BoxFuture<'_, Option<AbortResult>> + Send + Sync>;
/// After-verify hook: errors are logged and swallowed.
pub type AfterVerifyHook = Box<dyn Fn(&VerifyResultContext) -> BoxFuture<'_, ()> + Send + Sync>;
/// Verify-failure hook: may recover with a substitute result.
pub type VerifyFailureHook =
    Box<dyn Fn(&VerifyFailureContext) -> BoxFuture<'_, Option<RecoveredVerifyResult>> + Send + Sync>;

/// Before-settle hook: may abort the operation.
pub type BeforeSettleHook = Box<dyn Fn(&SettleContext) -> BoxFuture<'_, Option<AbortResult>> + Send + Sync>;
/// After-settle hook: errors are logged and swallowed.
pub type AfterSettleHook = Box<dyn Fn(&SettleResultContext) -> BoxFuture<'_, ()> + Send + Sync>;
/// Settle-failure hook: may recover with a substitute result.
pub type SettleFailureHook =
    Box<dyn Fn(&SettleFailureContext) -> BoxFuture<'_, Option<RecoveredSettleResult>> + Send + Sync>;
