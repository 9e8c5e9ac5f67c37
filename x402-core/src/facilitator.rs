//! The `Facilitator` component: verifies and settles payloads on behalf of
//! resource servers, decoupling them from blockchain RPC details.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainId, NetworkPattern, NetworkRegistry, Specificity};
use crate::extensions::{Extension, ExtensionSystem};
use crate::hooks::{
    AfterSettleHook, AfterVerifyHook, BeforeSettleHook, BeforeVerifyHook, PayloadView, RequirementsView,
    SettleContext, SettleFailureContext, SettleFailureHook, SettleResultContext, VerifyContext, VerifyFailureContext,
    VerifyFailureHook, VerifyResultContext,
};
use crate::proto::{PaymentVerificationError, SettleResponse, SupportedKind, SupportedResponse, VerifyResponse};
use crate::registry::MechanismRegistry;
use crate::scheme::FacilitatorScheme;

#[cfg(feature = "telemetry")]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => { tracing::$level!($($arg)*) };
}
#[cfg(not(feature = "telemetry"))]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => {{}};
}

/// Default ceiling on a single hook invocation before it is treated as
/// failed.
const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Verifies and settles payloads by routing `(version, network, scheme)` to
/// a registered [`FacilitatorScheme`], running before/after/failure hook
/// pipelines around each call.
pub struct Facilitator {
    registry: MechanismRegistry,
    networks: NetworkRegistry,
    extensions: ExtensionSystem,
    before_verify: Vec<BeforeVerifyHook>,
    after_verify: Vec<AfterVerifyHook>,
    verify_failure: Vec<VerifyFailureHook>,
    before_settle: Vec<BeforeSettleHook>,
    after_settle: Vec<AfterSettleHook>,
    settle_failure: Vec<SettleFailureHook>,
    hook_timeout: Duration,
}

impl Default for Facilitator {
    fn default() -> Self {
        Self {
            registry: MechanismRegistry::default(),
            networks: NetworkRegistry::default(),
            extensions: ExtensionSystem::default(),
            before_verify: Vec::new(),
            after_verify: Vec::new(),
            verify_failure: Vec::new(),
            before_settle: Vec::new(),
            after_settle: Vec::new(),
            settle_failure: Vec::new(),
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }
}

impl Facilitator {
    /// An empty facilitator with no registered mechanisms.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the per-hook-invocation timeout (default 5 seconds). A hook
    /// that exceeds it is treated the same as one that returned an error.
    pub fn set_hook_timeout(&mut self, timeout: Duration) {
        self.hook_timeout = timeout;
    }

    /// Registers a mechanism against one or more network patterns at the
    /// given protocol version.
    pub fn register(
        &mut self,
        version: u8,
        patterns: impl Into<Vec<NetworkPattern>>,
        scheme: impl Into<String>,
        mechanism: Arc<dyn FacilitatorScheme>,
    ) {
        self.registry.register_facilitator(version, patterns, scheme, mechanism);
    }

    /// Registers an extension (e.g. bazaar discovery).
    pub fn register_extension(&mut self, extension: Box<dyn Extension>) {
        self.extensions.register(extension);
    }

    /// Sets the v1-alias ↔ `ChainId` mappings used to resolve legacy
    /// `PaymentRequirements.network` aliases to a mechanism registration.
    pub fn set_networks(&mut self, networks: NetworkRegistry) {
        self.networks = networks;
    }

    /// Registers a before-verify hook.
    pub fn on_before_verify(&mut self, hook: BeforeVerifyHook) {
        self.before_verify.push(hook);
    }

    /// Registers an after-verify hook.
    pub fn on_after_verify(&mut self, hook: AfterVerifyHook) {
        self.after_verify.push(hook);
    }

    /// Registers a verify-failure hook.
    pub fn on_verify_failure(&mut self, hook: VerifyFailureHook) {
        self.verify_failure.push(hook);
    }

    /// Registers a before-settle hook.
    pub fn on_before_settle(&mut self, hook: BeforeSettleHook) {
        self.before_settle.push(hook);
    }

    /// Registers an after-settle hook.
    pub fn on_after_settle(&mut self, hook: AfterSettleHook) {
        self.after_settle.push(hook);
    }

    /// Registers a settle-failure hook.
    pub fn on_settle_failure(&mut self, hook: SettleFailureHook) {
        self.settle_failure.push(hook);
    }

    fn requirements_chain_id(&self, requirements: &RequirementsView) -> Result<ChainId, VerifyResponse> {
        match requirements {
            RequirementsView::V2(r) => Ok(r.network.clone()),
            RequirementsView::V1(r) => r
                .network
                .parse()
                .ok()
                .or_else(|| self.networks.chain_id_by_name(&r.network).cloned())
                .ok_or_else(|| VerifyResponse::invalid("invalid_network")),
        }
    }

    /// Resolves mechanism, runs before-verify hooks, delegates to the
    /// mechanism, then runs after-verify/verify-failure hooks.
    ///
    /// Never returns `Err`: every failure mode (unknown scheme, hook abort,
    /// mechanism error) is represented as a structural `VerifyResponse::Invalid`.
    pub async fn verify(&self, version: u8, payload: &PayloadView, requirements: &RequirementsView) -> VerifyResponse {
        let network = match self.requirements_chain_id(requirements) {
            Ok(network) => network,
            Err(response) => return response,
        };

        let mechanism = match self.registry.facilitator_mechanism(version, &network, requirements.scheme()) {
            Some(mechanism) => mechanism,
            None => return PaymentVerificationError::UnsupportedScheme.into(),
        };

        let ctx = VerifyContext { payload: payload.clone(), requirements: requirements.clone() };
        for hook in &self.before_verify {
            match tokio::time::timeout(self.hook_timeout, hook(&ctx)).await {
                Ok(Some(abort)) => return VerifyResponse::invalid(abort.reason),
                Ok(None) => {}
                Err(_) => {
                    traced!(warn, "before_verify hook timed out");
                    return self.run_verify_failure(payload, requirements, "hook_timeout".into(), VerifyResponse::invalid("hook_timeout")).await;
                }
            }
        }

        let outcome = mechanism.verify(payload, requirements).await;
        match outcome {
            Ok(result) if result.is_valid() => {
                let result_ctx = VerifyResultContext { payload: payload.clone(), requirements: requirements.clone(), result };
                for hook in &self.after_verify {
                    if tokio::time::timeout(self.hook_timeout, hook(&result_ctx)).await.is_err() {
                        traced!(warn, "after_verify hook timed out");
                    }
                }
                result_ctx.result
            }
            Ok(VerifyResponse::Invalid { invalid_reason, .. }) => {
                let fallback = VerifyResponse::invalid(invalid_reason.clone());
                self.run_verify_failure(payload, requirements, invalid_reason, fallback).await
            }
            Err(error) => {
                let message = error.to_string();
                let fallback = VerifyResponse::invalid("verification_error");
                self.run_verify_failure(payload, requirements, message, fallback).await
            }
        }
    }

    async fn run_verify_failure(
        &self,
        payload: &PayloadView,
        requirements: &RequirementsView,
        error: String,
        fallback: VerifyResponse,
    ) -> VerifyResponse {
        let ctx = VerifyFailureContext { payload: payload.clone(), requirements: requirements.clone(), error };
        for hook in &self.verify_failure {
            match tokio::time::timeout(self.hook_timeout, hook(&ctx)).await {
                Ok(Some(recovered)) => return recovered.result,
                Ok(None) => {}
                Err(_) => traced!(warn, "verify_failure hook timed out"),
            }
        }
        traced!(warn, error = %ctx.error, "verify failed and no hook recovered");
        fallback
    }

    /// Settles a payload. Critical rule: callers must not call `settle`
    /// without a prior successful `verify` in the same flow; mechanisms may
    /// re-verify defensively.
    pub async fn settle(&self, version: u8, payload: &PayloadView, requirements: &RequirementsView) -> SettleResponse {
        let network = match self.requirements_chain_id(requirements) {
            Ok(network) => network,
            Err(_) => {
                return SettleResponse::Error { error_reason: "invalid_network".into(), network: ChainId::new("unknown", "unknown") };
            }
        };

        let mechanism = match self.registry.facilitator_mechanism(version, &network, requirements.scheme()) {
            Some(mechanism) => mechanism,
            None => return SettleResponse::Error { error_reason: "scheme_not_found".into(), network },
        };

        let ctx = SettleContext { payload: payload.clone(), requirements: requirements.clone() };
        for hook in &self.before_settle {
            match tokio::time::timeout(self.hook_timeout, hook(&ctx)).await {
                Ok(Some(abort)) => return SettleResponse::Error { error_reason: abort.reason, network },
                Ok(None) => {}
                Err(_) => {
                    traced!(warn, "before_settle hook timed out");
                    let fallback = SettleResponse::Error { error_reason: "hook_timeout".into(), network: network.clone() };
                    return self.run_settle_failure(payload, requirements, "hook_timeout".into(), fallback).await;
                }
            }
        }

        match mechanism.settle(payload, requirements).await {
            Ok(result) if result.is_success() => {
                let result_ctx = SettleResultContext { payload: payload.clone(), requirements: requirements.clone(), result };
                for hook in &self.after_settle {
                    if tokio::time::timeout(self.hook_timeout, hook(&result_ctx)).await.is_err() {
                        traced!(warn, "after_settle hook timed out");
                    }
                }
                result_ctx.result
            }
            Ok(SettleResponse::Error { error_reason, network }) => {
                let fallback = SettleResponse::Error { error_reason: error_reason.clone(), network };
                self.run_settle_failure(payload, requirements, error_reason, fallback).await
            }
            Err(error) => {
                let fallback = SettleResponse::Error { error_reason: "settlement_error".into(), network: network.clone() };
                self.run_settle_failure(payload, requirements, error.to_string(), fallback).await
            }
        }
    }

    async fn run_settle_failure(
        &self,
        payload: &PayloadView,
        requirements: &RequirementsView,
        error: String,
        fallback: SettleResponse,
    ) -> SettleResponse {
        let ctx = SettleFailureContext { payload: payload.clone(), requirements: requirements.clone(), error };
        for hook in &self.settle_failure {
            match tokio::time::timeout(self.hook_timeout, hook(&ctx)).await {
                Ok(Some(recovered)) => return recovered.result,
                Ok(None) => {}
                Err(_) => traced!(warn, "settle_failure hook timed out"),
            }
        }
        traced!(warn, error = %ctx.error, "settle failed and no hook recovered");
        fallback
    }

    /// Enumerates every registered capability as a [`SupportedResponse`].
    ///
    /// Exact-pattern registrations are emitted as concrete kinds; wildcard
    /// registrations are skipped (mechanisms can still surface concrete
    /// networks separately via `FacilitatorScheme::get_extra`).
    #[must_use]
    pub fn get_supported(&self) -> SupportedResponse {
        let mut kinds = Vec::new();
        let mut signers: HashMap<String, Vec<String>> = HashMap::new();

        for (version, pattern, scheme, mechanism) in self.registry.facilitator_entries() {
            if pattern.specificity() != Specificity::Exact {
                continue;
            }
            let NetworkPattern::Exact { namespace, reference } = pattern else {
                continue;
            };
            let network = ChainId::new(namespace.clone(), reference.clone());
            kinds.push(SupportedKind {
                x402_version: version,
                scheme: scheme.to_string(),
                network: network.clone(),
                extra: mechanism.get_extra(&network),
            });
            let addresses = mechanism.get_signers(&network);
            if !addresses.is_empty() {
                signers.insert(network.to_string(), addresses);
            }
        }

        SupportedResponse {
            kinds,
            extensions: self.extensions.keys().into_iter().map(str::to_string).collect(),
            signers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::BoxFuture;
    use crate::proto::v2;
    use crate::scheme::SchemeError;

    struct CashFacilitator;

    impl FacilitatorScheme for CashFacilitator {
        fn scheme(&self) -> &str {
            "cash"
        }
        fn caip_family(&self) -> &str {
            "x402"
        }
        fn verify<'a>(
            &'a self,
            payload: &'a PayloadView,
            _requirements: &'a RequirementsView,
        ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
            Box::pin(async move {
                let PayloadView::V2(payload) = payload else { unreachable!() };
                let signature = payload.payload.get("signature").and_then(serde_json::Value::as_str).unwrap_or_default();
                if let Some(name) = signature.strip_prefix('~') {
                    Ok(VerifyResponse::Valid { payer: format!("~{name}") })
                } else {
                    Ok(VerifyResponse::invalid("invalid_signature"))
                }
            })
        }
        fn settle<'a>(
            &'a self,
            payload: &'a PayloadView,
            requirements: &'a RequirementsView,
        ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
            Box::pin(async move {
                let PayloadView::V2(payload) = payload else { unreachable!() };
                let name = payload.payload.get("name").and_then(serde_json::Value::as_str).unwrap_or_default();
                Ok(SettleResponse::Success {
                    payer: format!("~{name}"),
                    transaction: format!("{name} transferred {} {} to {}", requirements.amount(), "USD", requirements_pay_to(requirements)),
                    network: ChainId::new("x402", "cash"),
                })
            })
        }
    }

    fn requirements_pay_to(requirements: &RequirementsView) -> String {
        match requirements {
            RequirementsView::V2(r) => r.pay_to.clone(),
            RequirementsView::V1(r) => r.pay_to.clone(),
        }
    }

    fn cash_requirements() -> v2::PaymentRequirements {
        v2::PaymentRequirements {
            scheme: "cash".into(),
            network: ChainId::new("x402", "cash"),
            amount: "1".into(),
            pay_to: "Alice".into(),
            asset: "USD".into(),
            max_timeout_seconds: 300,
            extra: None,
        }
    }

    fn john_payload() -> v2::PaymentPayload {
        v2::PaymentPayload {
            x402_version: crate::proto::version::V2,
            resource: None,
            accepted: cash_requirements(),
            payload: serde_json::json!({"signature": "~John", "name": "John"}),
            extensions: None,
        }
    }

    #[tokio::test]
    async fn test_s1_successful_cash_payment() {
        let mut facilitator = Facilitator::new();
        facilitator.register(2, vec![NetworkPattern::exact("x402", "cash")], "cash", Arc::new(CashFacilitator));

        let payload = PayloadView::V2(Box::new(john_payload()));
        let requirements = RequirementsView::V2(cash_requirements());

        let verified = facilitator.verify(2, &payload, &requirements).await;
        assert_eq!(verified.payer(), Some("~John"));

        let settled = facilitator.settle(2, &payload, &requirements).await;
        assert!(settled.is_success());
    }

    #[tokio::test]
    async fn test_s2_tampered_signature_rejected() {
        let mut facilitator = Facilitator::new();
        facilitator.register(2, vec![NetworkPattern::exact("x402", "cash")], "cash", Arc::new(CashFacilitator));

        let mut tampered = john_payload();
        tampered.payload = serde_json::json!({"signature": "~Hacker", "name": "Hacker"});
        let payload = PayloadView::V2(Box::new(tampered));
        let requirements = RequirementsView::V2(cash_requirements());

        let verified = facilitator.verify(2, &payload, &requirements).await;
        assert!(!verified.is_valid());
    }

    #[test]
    fn test_get_supported_skips_wildcard_registrations() {
        let mut facilitator = Facilitator::new();
        facilitator.register(2, vec![NetworkPattern::wildcard("eip155")], "exact", Arc::new(CashFacilitator));
        facilitator.register(2, vec![NetworkPattern::exact("x402", "cash")], "cash", Arc::new(CashFacilitator));

        let supported = facilitator.get_supported();
        assert_eq!(supported.kinds.len(), 1);
        assert_eq!(supported.kinds[0].scheme, "cash");
    }

    #[tokio::test]
    async fn test_before_verify_hook_timeout_yields_invalid() {
        let mut facilitator = Facilitator::new();
        facilitator.register(2, vec![NetworkPattern::exact("x402", "cash")], "cash", Arc::new(CashFacilitator));
        facilitator.set_hook_timeout(std::time::Duration::from_millis(20));
        facilitator.on_before_verify(Box::new(|_ctx: &VerifyContext| {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                None
            })
        }));

        let payload = PayloadView::V2(Box::new(john_payload()));
        let requirements = RequirementsView::V2(cash_requirements());

        let verified = facilitator.verify(2, &payload, &requirements).await;
        assert!(!verified.is_valid());
    }

    #[tokio::test]
    async fn test_after_verify_hook_timeout_does_not_affect_result() {
        let mut facilitator = Facilitator::new();
        facilitator.register(2, vec![NetworkPattern::exact("x402", "cash")], "cash", Arc::new(CashFacilitator));
        facilitator.set_hook_timeout(std::time::Duration::from_millis(20));
        facilitator.on_after_verify(Box::new(|_ctx: &VerifyResultContext| {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            })
        }));

        let payload = PayloadView::V2(Box::new(john_payload()));
        let requirements = RequirementsView::V2(cash_requirements());

        let verified = facilitator.verify(2, &payload, &requirements).await;
        assert_eq!(verified.payer(), Some("~John"));
    }
}
