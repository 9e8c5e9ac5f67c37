//! The `Client` component: selects an accepted requirement from a
//! `PaymentRequired` response and builds the signed payload that satisfies it.

use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainId, NetworkPattern, NetworkRegistry};
use crate::error::{NoMatchingRequirementsError, PaymentError, SchemeNotFoundError};
use crate::extensions::{Extension, ExtensionSystem};
use crate::hooks::{
    AfterPaymentCreationHook, BeforePaymentCreationHook, PaymentCreatedContext, PaymentCreationContext,
    PaymentCreationFailureContext, PaymentCreationFailureHook, PayloadView, PaymentRequiredView, RequirementsView,
};
use crate::proto::{v1, v2};
use crate::registry::MechanismRegistry;
use crate::scheme::ClientScheme;

#[cfg(feature = "telemetry")]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => { tracing::$level!($($arg)*) };
}
#[cfg(not(feature = "telemetry"))]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => {{}};
}

/// Filters and/or reorders candidate requirements. Applied in registration
/// order; a policy that returns an empty `Vec` aborts selection.
pub type PaymentPolicy = Box<dyn Fn(u8, Vec<RequirementsView>) -> Vec<RequirementsView> + Send + Sync>;

/// Picks the final requirement's index out of the policy-filtered candidates.
pub type PaymentRequirementsSelector = Box<dyn Fn(u8, &[RequirementsView]) -> usize + Send + Sync>;

const fn default_selector(_version: u8, _candidates: &[RequirementsView]) -> usize {
    0
}

/// Default ceiling on a single hook invocation before it is treated as
/// failed.
const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(5);

fn network_of(requirements: &RequirementsView) -> String {
    requirements.network()
}

/// A policy that moves requirements on `network` to the front, stable
/// otherwise.
#[must_use]
pub fn prefer_network(network: ChainId) -> PaymentPolicy {
    let target = network.to_string();
    Box::new(move |_version, candidates| {
        let (preferred, others): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|r| network_of(r) == target);
        preferred.into_iter().chain(others).collect()
    })
}

/// A policy that moves requirements using `scheme` to the front, stable otherwise.
#[must_use]
pub fn prefer_scheme(scheme: impl Into<String>) -> PaymentPolicy {
    let target = scheme.into();
    Box::new(move |_version, candidates| {
        let (preferred, others): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|r| r.scheme() == target);
        preferred.into_iter().chain(others).collect()
    })
}

/// A policy that drops requirements whose amount exceeds `max_value` atomic units.
#[must_use]
pub fn max_amount(max_value: u128) -> PaymentPolicy {
    Box::new(move |_version, candidates| {
        candidates.into_iter().filter(|r| r.amount().parse::<u128>().is_ok_and(|amount| amount <= max_value)).collect()
    })
}

/// Selects an accepted requirement, builds the scheme-specific signed
/// authorization via a registered [`ClientScheme`], and assembles the
/// resulting `PaymentPayload`, with a before/after/failure hook lifecycle
/// around mechanism invocation.
pub struct Client {
    registry: MechanismRegistry,
    networks: NetworkRegistry,
    extensions: ExtensionSystem,
    policies: Vec<PaymentPolicy>,
    selector: PaymentRequirementsSelector,
    before_creation: Vec<BeforePaymentCreationHook>,
    after_creation: Vec<AfterPaymentCreationHook>,
    creation_failure: Vec<PaymentCreationFailureHook>,
    hook_timeout: Duration,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// A client with the default (first-candidate) selector and no policies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: MechanismRegistry::new(),
            networks: NetworkRegistry::new(),
            extensions: ExtensionSystem::new(),
            policies: Vec::new(),
            selector: Box::new(default_selector),
            before_creation: Vec::new(),
            after_creation: Vec::new(),
            creation_failure: Vec::new(),
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    /// Overrides the per-hook-invocation timeout (default 5 seconds). A hook
    /// that exceeds it is treated the same as one that returned an error.
    pub fn set_hook_timeout(&mut self, timeout: Duration) {
        self.hook_timeout = timeout;
    }

    /// A client with a custom selector.
    #[must_use]
    pub fn with_selector(selector: PaymentRequirementsSelector) -> Self {
        Self { selector, ..Self::new() }
    }

    /// Sets the v1-alias ↔ `ChainId` mappings used to resolve legacy
    /// `PaymentRequirements.network` aliases to a mechanism registration.
    pub fn set_networks(&mut self, networks: NetworkRegistry) {
        self.networks = networks;
    }

    /// Registers a client mechanism against one or more network patterns.
    pub fn register_scheme(
        &mut self,
        version: u8,
        patterns: impl Into<Vec<NetworkPattern>>,
        scheme: impl Into<String>,
        mechanism: Arc<dyn ClientScheme>,
    ) {
        self.registry.register_client(version, patterns, scheme, mechanism);
    }

    /// Registers an extension (e.g. payment-identifier idempotency).
    pub fn register_extension(&mut self, extension: Box<dyn Extension>) {
        self.extensions.register(extension);
    }

    /// Adds a requirement filter/reorder policy, applied after the ones
    /// already registered.
    pub fn register_policy(&mut self, policy: PaymentPolicy) {
        self.policies.push(policy);
    }

    /// Registers a before-payment-creation hook.
    pub fn on_before_payment_creation(&mut self, hook: BeforePaymentCreationHook) {
        self.before_creation.push(hook);
    }

    /// Registers an after-payment-creation hook.
    pub fn on_after_payment_creation(&mut self, hook: AfterPaymentCreationHook) {
        self.after_creation.push(hook);
    }

    /// Registers a payment-creation-failure hook.
    pub fn on_payment_creation_failure(&mut self, hook: PaymentCreationFailureHook) {
        self.creation_failure.push(hook);
    }

    /// Filters `candidates` down to those a registered mechanism can satisfy,
    /// then runs the registered policies, then applies the selector.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeNotFoundError`] if no candidate has a registered
    /// mechanism at all (no `(version, network, scheme)` in `candidates` is
    /// known to this client), or [`NoMatchingRequirementsError`] if every
    /// supported candidate is filtered out by a policy, or the selector picks
    /// an out-of-range index.
    pub fn select_requirements(&self, version: u8, candidates: Vec<RequirementsView>) -> Result<RequirementsView, PaymentError> {
        let mut first_candidate: Option<RequirementsView> = None;
        let mut supported: Vec<RequirementsView> = Vec::new();
        for candidate in candidates {
            if first_candidate.is_none() {
                first_candidate = Some(candidate.clone());
            }
            if self.mechanism_for(version, &candidate).is_some() {
                supported.push(candidate);
            }
        }

        if supported.is_empty() {
            let (network, scheme) = first_candidate
                .as_ref()
                .map(|candidate| (candidate.network(), Some(candidate.scheme().to_string())))
                .unwrap_or_else(|| (String::new(), None));
            return Err(SchemeNotFoundError::new(version, network, scheme).into());
        }

        for policy in &self.policies {
            supported = policy(version, supported);
            if supported.is_empty() {
                return Err(NoMatchingRequirementsError::new("all requirements filtered out by policies").into());
            }
        }

        let index = (self.selector)(version, &supported);
        supported
            .into_iter()
            .nth(index)
            .ok_or_else(|| NoMatchingRequirementsError::new("selector returned an out-of-range index").into())
    }

    fn mechanism_for(&self, version: u8, requirements: &RequirementsView) -> Option<Arc<dyn ClientScheme>> {
        let network = self.resolve_network(requirements)?;
        self.registry.client_mechanism(version, &network, requirements.scheme())
    }

    /// Resolves a requirement's network to a `ChainId`: parsed directly for
    /// v2's CAIP-2 identifiers, or via the v1-alias registry for v1's legacy
    /// aliases.
    fn resolve_network(&self, requirements: &RequirementsView) -> Option<ChainId> {
        let raw = requirements.network();
        raw.parse().ok().or_else(|| self.networks.chain_id_by_name(&raw).cloned())
    }

    /// Selects a requirement from `payment_required.accepts`, invokes the
    /// matching mechanism to build the signed authorization, and assembles
    /// the final `PaymentPayload`, running the before/after/failure hook
    /// lifecycle around mechanism invocation.
    ///
    /// # Errors
    ///
    /// Returns a [`PaymentError`] if selection fails, a before-hook aborts,
    /// or mechanism invocation fails and no hook recovers it.
    pub async fn create_payment_payload(&self, payment_required: &PaymentRequiredView) -> Result<PayloadView, PaymentError> {
        let version = payment_required.version();
        let candidates = match payment_required {
            PaymentRequiredView::V1(required) => required.accepts.iter().cloned().map(RequirementsView::V1).collect(),
            PaymentRequiredView::V2(required) => required.accepts.iter().cloned().map(RequirementsView::V2).collect(),
        };
        let selected = self.select_requirements(version, candidates)?;

        let ctx = PaymentCreationContext { payment_required: payment_required.clone(), selected_requirements: selected.clone() };
        for hook in &self.before_creation {
            match tokio::time::timeout(self.hook_timeout, hook(&ctx)).await {
                Ok(Some(abort)) => return Err(crate::error::PaymentAbortedError::new(abort.reason).into()),
                Ok(None) => {}
                Err(_) => {
                    traced!(warn, "before_payment_creation hook timed out");
                    return Err(crate::error::PaymentAbortedError::new("hook_timeout").into());
                }
            }
        }

        let mechanism = self
            .mechanism_for(version, &selected)
            .ok_or_else(|| SchemeNotFoundError::new(version, selected.network(), Some(selected.scheme().to_string())))?;

        match mechanism.create_payment_payload(&selected).await {
            Ok(signed) => {
                let payload = assemble_payload(payment_required, &selected, signed);
                let created_ctx = PaymentCreatedContext { selected_requirements: selected, payment_payload: payload };
                for hook in &self.after_creation {
                    if tokio::time::timeout(self.hook_timeout, hook(&created_ctx)).await.is_err() {
                        traced!(warn, "after_payment_creation hook timed out");
                    }
                }
                Ok(created_ctx.payment_payload)
            }
            Err(error) => {
                let message = error.to_string();
                let failure_ctx = PaymentCreationFailureContext { selected_requirements: selected, error: message.clone() };
                for hook in &self.creation_failure {
                    match tokio::time::timeout(self.hook_timeout, hook(&failure_ctx)).await {
                        Ok(Some(recovered)) => {
                            return Ok(match recovered.payload {
                                crate::proto::PaymentPayload::V1(payload) => PayloadView::V1(payload),
                                crate::proto::PaymentPayload::V2(payload) => PayloadView::V2(payload),
                            });
                        }
                        Ok(None) => {}
                        Err(_) => traced!(warn, "payment_creation_failure hook timed out"),
                    }
                }
                traced!(warn, error = %message, "payment creation failed and no hook recovered");
                Err(PaymentError::MechanismFailure(message))
            }
        }
    }
}

fn assemble_payload(payment_required: &PaymentRequiredView, selected: &RequirementsView, signed: serde_json::Value) -> PayloadView {
    match (payment_required, selected) {
        (PaymentRequiredView::V2(required), RequirementsView::V2(accepted)) => PayloadView::V2(Box::new(v2::PaymentPayload {
            x402_version: crate::proto::version::V2,
            resource: Some(required.resource.clone()),
            accepted: accepted.clone(),
            payload: signed,
            extensions: required.extensions.clone(),
        })),
        (PaymentRequiredView::V1(_), RequirementsView::V1(accepted)) => PayloadView::V1(v1::PaymentPayload {
            x402_version: crate::proto::version::V1,
            scheme: accepted.scheme.clone(),
            network: accepted.network.clone(),
            resource: None,
            payload: signed,
        }),
        _ => unreachable!("select_requirements always returns a view matching payment_required's version"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::BoxFuture;
    use crate::scheme::SchemeError;

    struct CashClient;

    impl ClientScheme for CashClient {
        fn scheme(&self) -> &str {
            "cash"
        }
        fn create_payment_payload<'a>(&'a self, requirements: &'a RequirementsView) -> BoxFuture<'a, Result<serde_json::Value, SchemeError>> {
            Box::pin(async move { Ok(serde_json::json!({"signature": "~John", "name": "John", "amount": requirements.amount()})) })
        }
    }

    fn requirements(network: ChainId, amount: &str) -> v2::PaymentRequirements {
        v2::PaymentRequirements {
            scheme: "cash".into(),
            network,
            amount: amount.into(),
            pay_to: "Alice".into(),
            asset: "USD".into(),
            max_timeout_seconds: 300,
            extra: None,
        }
    }

    fn payment_required(accepts: Vec<v2::PaymentRequirements>) -> v2::PaymentRequired {
        v2::PaymentRequired::new(
            v2::ResourceInfo { url: "https://example.test/x".into(), description: String::new(), mime_type: "text/plain".into() },
            accepts,
            None,
            None,
        )
    }

    #[tokio::test]
    async fn test_create_payment_payload_selects_and_signs() {
        let mut client = Client::new();
        client.register_scheme(2, vec![NetworkPattern::exact("x402", "cash")], "cash", Arc::new(CashClient));

        let required = payment_required(vec![requirements(ChainId::new("x402", "cash"), "100")]);
        let view = PaymentRequiredView::V2(required);

        let payload = client.create_payment_payload(&view).await.unwrap();
        let PayloadView::V2(payload) = payload else { panic!("expected v2 payload") };
        assert_eq!(payload.payload["signature"], "~John");
        assert_eq!(payload.accepted.amount, "100");
    }

    #[tokio::test]
    async fn test_create_payment_payload_errors_without_registered_mechanism() {
        let client = Client::new();
        let required = payment_required(vec![requirements(ChainId::new("x402", "cash"), "100")]);
        let view = PaymentRequiredView::V2(required);
        let error = client.create_payment_payload(&view).await.unwrap_err();
        assert!(matches!(error, PaymentError::SchemeNotFound(_)));
    }

    #[test]
    fn test_max_amount_policy_filters() {
        let policy = max_amount(500);
        let candidates = vec![
            RequirementsView::V2(requirements(ChainId::new("x402", "cash"), "100")),
            RequirementsView::V2(requirements(ChainId::new("x402", "cash"), "1000")),
        ];
        let filtered = policy(2, candidates);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].amount(), "100");
    }

    #[test]
    fn test_prefer_network_reorders_without_dropping() {
        let policy = prefer_network(ChainId::new("x402", "cash"));
        let candidates = vec![
            RequirementsView::V2(requirements(ChainId::new("eip155", "8453"), "100")),
            RequirementsView::V2(requirements(ChainId::new("x402", "cash"), "200")),
        ];
        let reordered = policy(2, candidates);
        assert_eq!(reordered[0].network(), "x402:cash");
    }
}
