//! The `ResourceServer` component: prices protected resources, builds
//! `PaymentRequired` responses, and delegates verify/settle to a facilitator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainId, NetworkPattern, NetworkRegistry};
use crate::config::ResourceConfig;
use crate::error::{NotInitializedError, PaymentError, SchemeNotFoundError};
use crate::extensions::{Extension, ExtensionSystem};
use crate::hooks::{
    AfterSettleHook, AfterVerifyHook, BeforeSettleHook, BeforeVerifyHook, PayloadView, RequirementsView,
    SettleContext, SettleFailureContext, SettleFailureHook, SettleResultContext, VerifyContext, VerifyFailureContext,
    VerifyFailureHook, VerifyResultContext,
};
use crate::proto::version::V2;
use crate::proto::{Extensions, SettleResponse, SupportedKind, SupportedResponse, VerifyResponse, v2};
use crate::registry::MechanismRegistry;
use crate::scheme::{PriceInput, SchemeError, ServerScheme};

#[cfg(feature = "telemetry")]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => { tracing::$level!($($arg)*) };
}
#[cfg(not(feature = "telemetry"))]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => {{}};
}

/// A resource server's view onto a facilitator: verify/settle a payload, and
/// discover what the facilitator supports. The in-process [`crate::facilitator::Facilitator`]
/// implements this directly; `x402-http` provides an HTTP-backed implementation.
pub trait FacilitatorClient: Send + Sync {
    /// Verifies `payload` against `requirements`.
    fn verify<'a>(
        &'a self,
        version: u8,
        payload: &'a PayloadView,
        requirements: &'a RequirementsView,
    ) -> crate::hooks::BoxFuture<'a, Result<VerifyResponse, SchemeError>>;

    /// Settles `payload` against `requirements`.
    fn settle<'a>(
        &'a self,
        version: u8,
        payload: &'a PayloadView,
        requirements: &'a RequirementsView,
    ) -> crate::hooks::BoxFuture<'a, Result<SettleResponse, SchemeError>>;

    /// The facilitator's full capability advertisement.
    fn get_supported(&self) -> crate::hooks::BoxFuture<'_, Result<SupportedResponse, SchemeError>>;
}

impl FacilitatorClient for crate::facilitator::Facilitator {
    fn verify<'a>(
        &'a self,
        version: u8,
        payload: &'a PayloadView,
        requirements: &'a RequirementsView,
    ) -> crate::hooks::BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
        Box::pin(async move { Ok(self.verify(version, payload, requirements).await) })
    }

    fn settle<'a>(
        &'a self,
        version: u8,
        payload: &'a PayloadView,
        requirements: &'a RequirementsView,
    ) -> crate::hooks::BoxFuture<'a, Result<SettleResponse, SchemeError>> {
        Box::pin(async move { Ok(self.settle(version, payload, requirements).await) })
    }

    fn get_supported(&self) -> crate::hooks::BoxFuture<'_, Result<SupportedResponse, SchemeError>> {
        Box::pin(async move { Ok(self.get_supported()) })
    }
}

/// A `(version, network, scheme)` key into the facilitator lookup table.
type SupportedKey = (u8, String, String);

/// Default ceiling on a single hook invocation before it is treated as
/// failed.
const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Prices resources, builds `PaymentRequired` responses, and verifies/settles
/// payloads via one or more [`FacilitatorClient`]s, with a full before/after/
/// failure hook lifecycle around verify and settle.
pub struct ResourceServer {
    server_registry: MechanismRegistry,
    networks: NetworkRegistry,
    facilitator_clients: Vec<Arc<dyn FacilitatorClient>>,
    facilitator_index: HashMap<SupportedKey, usize>,
    supported_kinds: HashMap<SupportedKey, SupportedKind>,
    extensions: ExtensionSystem,
    before_verify: Vec<BeforeVerifyHook>,
    after_verify: Vec<AfterVerifyHook>,
    verify_failure: Vec<VerifyFailureHook>,
    before_settle: Vec<BeforeSettleHook>,
    after_settle: Vec<AfterSettleHook>,
    settle_failure: Vec<SettleFailureHook>,
    initialized: bool,
    hook_timeout: Duration,
}

impl Default for ResourceServer {
    fn default() -> Self {
        Self {
            server_registry: MechanismRegistry::default(),
            networks: NetworkRegistry::default(),
            facilitator_clients: Vec::new(),
            facilitator_index: HashMap::new(),
            supported_kinds: HashMap::new(),
            extensions: ExtensionSystem::default(),
            before_verify: Vec::new(),
            after_verify: Vec::new(),
            verify_failure: Vec::new(),
            before_settle: Vec::new(),
            after_settle: Vec::new(),
            settle_failure: Vec::new(),
            initialized: false,
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }
}

impl ResourceServer {
    /// An empty resource server with no facilitators registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the per-hook-invocation timeout (default 5 seconds). A hook
    /// that exceeds it is treated the same as one that returned an error.
    pub fn set_hook_timeout(&mut self, timeout: Duration) {
        self.hook_timeout = timeout;
    }

    /// Registers a server-side scheme mechanism (pricing + requirement enhancement).
    pub fn register_scheme(
        &mut self,
        version: u8,
        patterns: impl Into<Vec<NetworkPattern>>,
        scheme: impl Into<String>,
        mechanism: Arc<dyn ServerScheme>,
    ) {
        self.server_registry.register_server(version, patterns, scheme, mechanism);
    }

    /// Adds a facilitator client. Must call [`Self::initialize`] afterward.
    pub fn add_facilitator(&mut self, client: Arc<dyn FacilitatorClient>) {
        self.facilitator_clients.push(client);
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

    /// Fetches `get_supported()` from every registered facilitator client and
    /// indexes the results. Must run before `build_payment_requirements`,
    /// `verify_payment`, or `settle_payment`.
    ///
    /// # Errors
    ///
    /// Returns an error if any facilitator client fails to respond.
    pub async fn initialize(&mut self) -> Result<(), SchemeError> {
        for (index, client) in self.facilitator_clients.iter().enumerate() {
            let supported = client.get_supported().await?;
            for kind in supported.kinds {
                let key = (kind.x402_version, kind.network.to_string(), kind.scheme.clone());
                self.facilitator_index.entry(key.clone()).or_insert(index);
                self.supported_kinds.entry(key).or_insert(kind);
            }
        }
        self.initialized = true;
        Ok(())
    }

    /// Whether [`Self::initialize`] has completed.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Builds one `PaymentRequirements` per concrete network the facilitator
    /// advertises that matches `config.network` and `config.scheme`.
    ///
    /// # Errors
    ///
    /// Returns an error if not initialized, no facilitator advertises a
    /// matching network/scheme, no local `ServerScheme` mechanism is
    /// registered for it, or price parsing fails.
    pub fn build_payment_requirements(&self, config: &ResourceConfig) -> Result<Vec<v2::PaymentRequirements>, SchemeError> {
        if !self.initialized {
            return Err(Box::new(NotInitializedError));
        }

        let price = price_input(&config.price)?;
        let mut built = Vec::new();

        for ((version, network_str, scheme), kind) in &self.supported_kinds {
            if *version != V2.value() || *scheme != config.scheme {
                continue;
            }
            let network: ChainId = network_str.parse()?;
            if !config.network.matches(&network) {
                continue;
            }

            let mechanism = self
                .server_registry
                .server_mechanism(*version, &network, scheme)
                .ok_or_else(|| SchemeNotFoundError::new(*version, network_str.clone(), Some(scheme.clone())))?;

            let amount = mechanism.parse_price(&price, &network)?;
            let base = v2::PaymentRequirements {
                scheme: config.scheme.clone(),
                network,
                amount: amount.amount,
                pay_to: config.pay_to.clone(),
                asset: amount.asset,
                max_timeout_seconds: config.max_timeout_seconds.unwrap_or(300),
                extra: config.extra.clone(),
            };
            built.push(mechanism.enhance_requirements(base, kind));
        }

        if built.is_empty() {
            return Err(Box::new(SchemeNotFoundError::new(V2.value(), config.network.to_string(), Some(config.scheme.clone()))));
        }
        Ok(built)
    }

    /// Builds a `PaymentRequired` response from a set of requirements.
    ///
    /// `extensions` is the resource's declared extension data (e.g.
    /// `{"payment-identifier": declare_payment_identifier_extension(true)}`);
    /// each declared key is run through the matching registered
    /// [`Extension::enrich_declaration`] before being attached to the
    /// response.
    #[must_use]
    pub fn create_payment_required_response(
        &self,
        accepts: Vec<v2::PaymentRequirements>,
        resource: v2::ResourceInfo,
        error: Option<String>,
        extensions: Option<Extensions>,
    ) -> v2::PaymentRequired {
        let enriched = extensions.map(|declared| {
            let declared: serde_json::Map<String, serde_json::Value> = declared.into_iter().collect();
            self.extensions.enrich_all(declared, &serde_json::Value::Null).into_iter().collect()
        });
        v2::PaymentRequired::new(resource, accepts, enriched, error)
    }

    /// Finds the offered requirement that matches `payload.accepted`, per
    /// [`v2::PaymentRequirements::matches_accepted`].
    #[must_use]
    pub fn find_matching_requirements<'a>(
        &self,
        available: &'a [v2::PaymentRequirements],
        payload: &v2::PaymentPayload,
    ) -> Option<&'a v2::PaymentRequirements> {
        available.iter().find(|candidate| payload.accepted.matches_accepted(candidate))
    }

    /// Resolves a requirement's network to a `ChainId`: parsed directly for
    /// v2's CAIP-2 identifiers, or via the v1-alias registry for v1's legacy
    /// aliases.
    fn resolve_network(&self, requirements: &RequirementsView) -> Option<ChainId> {
        let raw = requirements.network();
        raw.parse().ok().or_else(|| self.networks.chain_id_by_name(&raw).cloned())
    }

    fn facilitator_for(&self, version: u8, network: &ChainId, scheme: &str) -> Result<&Arc<dyn FacilitatorClient>, SchemeNotFoundError> {
        let key = (version, network.to_string(), scheme.to_string());
        self.facilitator_index
            .get(&key)
            .and_then(|index| self.facilitator_clients.get(*index))
            .ok_or_else(|| SchemeNotFoundError::new(version, network.to_string(), Some(scheme.to_string())))
    }

    /// Verifies a payload via the appropriate facilitator, running the full
    /// before/after/failure hook lifecycle. Failure hooks run both when the
    /// facilitator call errors *and* when it returns a structural
    /// `VerifyResponse::Invalid` — both represent a failed attempt a
    /// recovery hook might want to intercept.
    ///
    /// # Errors
    ///
    /// Returns an error if not initialized, a before-hook aborts, no
    /// facilitator is registered for the requirement's network/scheme, or the
    /// facilitator call errors and no failure hook recovers.
    pub async fn verify_payment(&self, payload: &PayloadView, requirements: &RequirementsView) -> Result<VerifyResponse, PaymentError> {
        if !self.initialized {
            return Err(NotInitializedError.into());
        }

        let ctx = VerifyContext { payload: payload.clone(), requirements: requirements.clone() };
        for hook in &self.before_verify {
            match tokio::time::timeout(self.hook_timeout, hook(&ctx)).await {
                Ok(Some(abort)) => {
                    let reason = abort.reason;
                    return self.run_verify_failure(payload, requirements, reason.clone(), Ok(VerifyResponse::invalid(reason))).await;
                }
                Ok(None) => {}
                Err(_) => {
                    traced!(warn, "before_verify hook timed out");
                    return self.run_verify_failure(payload, requirements, "hook_timeout".into(), Ok(VerifyResponse::invalid("hook_timeout"))).await;
                }
            }
        }

        let network = self
            .resolve_network(requirements)
            .ok_or_else(|| PaymentError::MechanismFailure("invalid network".into()))?;
        let client = self
            .facilitator_for(version_of(requirements), &network, requirements.scheme())
            .map_err(PaymentError::from)?;

        let outcome = client.verify(version_of(requirements), payload, requirements).await;
        match outcome {
            Ok(result) if result.is_valid() => {
                let result_ctx = VerifyResultContext { payload: payload.clone(), requirements: requirements.clone(), result };
                for hook in &self.after_verify {
                    if tokio::time::timeout(self.hook_timeout, hook(&result_ctx)).await.is_err() {
                        traced!(warn, "after_verify hook timed out");
                    }
                }
                Ok(result_ctx.result)
            }
            Ok(result) => {
                let reason = match &result {
                    VerifyResponse::Invalid { invalid_reason, .. } => invalid_reason.clone(),
                    VerifyResponse::Valid { .. } => unreachable!(),
                };
                self.run_verify_failure(payload, requirements, reason, Ok(result)).await
            }
            Err(error) => {
                let message = error.to_string();
                self.run_verify_failure(payload, requirements, message.clone(), Ok(VerifyResponse::invalid(message))).await
            }
        }
    }

    async fn run_verify_failure(
        &self,
        payload: &PayloadView,
        requirements: &RequirementsView,
        error: String,
        fallback: Result<VerifyResponse, PaymentError>,
    ) -> Result<VerifyResponse, PaymentError> {
        let ctx = VerifyFailureContext { payload: payload.clone(), requirements: requirements.clone(), error };
        for hook in &self.verify_failure {
            match tokio::time::timeout(self.hook_timeout, hook(&ctx)).await {
                Ok(Some(recovered)) => return Ok(recovered.result),
                Ok(None) => {}
                Err(_) => traced!(warn, "verify_failure hook timed out"),
            }
        }
        traced!(warn, error = %ctx.error, "verify failed and no hook recovered");
        fallback
    }

    /// Settles a payload via the appropriate facilitator, mirroring
    /// [`Self::verify_payment`]'s hook lifecycle. Callers must only call this
    /// after a successful `verify_payment` in the same request.
    ///
    /// # Errors
    ///
    /// See [`Self::verify_payment`].
    pub async fn settle_payment(&self, payload: &PayloadView, requirements: &RequirementsView) -> Result<SettleResponse, PaymentError> {
        if !self.initialized {
            return Err(NotInitializedError.into());
        }

        let fallback_network = self.resolve_network(requirements).unwrap_or_else(|| ChainId::new("unknown", "unknown"));

        let ctx = SettleContext { payload: payload.clone(), requirements: requirements.clone() };
        for hook in &self.before_settle {
            match tokio::time::timeout(self.hook_timeout, hook(&ctx)).await {
                Ok(Some(abort)) => {
                    let reason = abort.reason;
                    let fallback = SettleResponse::Error { error_reason: reason.clone(), network: fallback_network.clone() };
                    return self.run_settle_failure(payload, requirements, reason, Ok(fallback)).await;
                }
                Ok(None) => {}
                Err(_) => {
                    traced!(warn, "before_settle hook timed out");
                    let fallback = SettleResponse::Error { error_reason: "hook_timeout".into(), network: fallback_network.clone() };
                    return self.run_settle_failure(payload, requirements, "hook_timeout".into(), Ok(fallback)).await;
                }
            }
        }

        let network = self
            .resolve_network(requirements)
            .ok_or_else(|| PaymentError::MechanismFailure("invalid network".into()))?;
        let client = self
            .facilitator_for(version_of(requirements), &network, requirements.scheme())
            .map_err(PaymentError::from)?;

        let outcome = client.settle(version_of(requirements), payload, requirements).await;
        match outcome {
            Ok(result) if result.is_success() => {
                let result_ctx = SettleResultContext { payload: payload.clone(), requirements: requirements.clone(), result };
                for hook in &self.after_settle {
                    if tokio::time::timeout(self.hook_timeout, hook(&result_ctx)).await.is_err() {
                        traced!(warn, "after_settle hook timed out");
                    }
                }
                Ok(result_ctx.result)
            }
            Ok(result) => {
                let reason = match &result {
                    SettleResponse::Error { error_reason, .. } => error_reason.clone(),
                    SettleResponse::Success { .. } => unreachable!(),
                };
                self.run_settle_failure(payload, requirements, reason, Ok(result)).await
            }
            Err(error) => {
                let message = error.to_string();
                let fallback = SettleResponse::Error { error_reason: message.clone(), network: network.clone() };
                self.run_settle_failure(payload, requirements, message, Ok(fallback)).await
            }
        }
    }

    async fn run_settle_failure(
        &self,
        payload: &PayloadView,
        requirements: &RequirementsView,
        error: String,
        fallback: Result<SettleResponse, PaymentError>,
    ) -> Result<SettleResponse, PaymentError> {
        let ctx = SettleFailureContext { payload: payload.clone(), requirements: requirements.clone(), error };
        for hook in &self.settle_failure {
            match tokio::time::timeout(self.hook_timeout, hook(&ctx)).await {
                Ok(Some(recovered)) => return Ok(recovered.result),
                Ok(None) => {}
                Err(_) => traced!(warn, "settle_failure hook timed out"),
            }
        }
        traced!(warn, error = %ctx.error, "settle failed and no hook recovered");
        fallback
    }
}

fn version_of(requirements: &RequirementsView) -> u8 {
    match requirements {
        RequirementsView::V1(_) => 1,
        RequirementsView::V2(_) => 2,
    }
}

fn price_input(price: &serde_json::Value) -> Result<PriceInput, SchemeError> {
    match price {
        serde_json::Value::String(s) => Ok(PriceInput::Money(s.clone())),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(PriceInput::Number)
            .ok_or_else(|| "price number out of range".into()),
        serde_json::Value::Object(_) => {
            let asset: crate::amount::AssetAmount = serde_json::from_value(price.clone())?;
            Ok(PriceInput::Asset(asset))
        }
        other => Err(format!("unsupported price shape: {other}").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::BoxFuture;

    struct FlatRateScheme;

    impl ServerScheme for FlatRateScheme {
        fn scheme(&self) -> &str {
            "cash"
        }
        fn parse_price(&self, price: &PriceInput, _network: &ChainId) -> Result<crate::amount::AssetAmount, SchemeError> {
            match price {
                PriceInput::Money(money) => {
                    let atomic = crate::amount::parse_fiat_price(money, 2)?;
                    Ok(crate::amount::AssetAmount::new(atomic.to_string(), "USD"))
                }
                _ => Err("unsupported price input".into()),
            }
        }
    }

    struct StaticFacilitatorClient {
        supported: SupportedResponse,
    }

    impl FacilitatorClient for StaticFacilitatorClient {
        fn verify<'a>(
            &'a self,
            _version: u8,
            _payload: &'a PayloadView,
            _requirements: &'a RequirementsView,
        ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
            Box::pin(async { Ok(VerifyResponse::Valid { payer: "Alice".into() }) })
        }
        fn settle<'a>(
            &'a self,
            _version: u8,
            _payload: &'a PayloadView,
            _requirements: &'a RequirementsView,
        ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
            Box::pin(async {
                Ok(SettleResponse::Success {
                    payer: "Alice".into(),
                    transaction: "tx".into(),
                    network: ChainId::new("x402", "cash"),
                })
            })
        }
        fn get_supported(&self) -> BoxFuture<'_, Result<SupportedResponse, SchemeError>> {
            let supported = self.supported.clone();
            Box::pin(async move { Ok(supported) })
        }
    }

    fn kind() -> SupportedKind {
        SupportedKind { x402_version: 2, scheme: "cash".into(), network: ChainId::new("x402", "cash"), extra: None }
    }

    async fn initialized_server() -> ResourceServer {
        let mut server = ResourceServer::new();
        server.register_scheme(2, vec![NetworkPattern::exact("x402", "cash")], "cash", Arc::new(FlatRateScheme));
        server.add_facilitator(Arc::new(StaticFacilitatorClient {
            supported: SupportedResponse { kinds: vec![kind()], ..Default::default() },
        }));
        server.initialize().await.unwrap();
        server
    }

    #[tokio::test]
    async fn test_build_payment_requirements_prices_via_local_mechanism() {
        let server = initialized_server().await;
        let config = ResourceConfig {
            scheme: "cash".into(),
            network: NetworkPattern::exact("x402", "cash"),
            pay_to: "Alice".into(),
            price: serde_json::json!("$0.01"),
            max_timeout_seconds: None,
            extra: None,
        };
        let requirements = server.build_payment_requirements(&config).unwrap();
        assert_eq!(requirements.len(), 1);
        assert_eq!(requirements[0].amount, "1");
        assert_eq!(requirements[0].asset, "USD");
    }

    #[tokio::test]
    async fn test_build_payment_requirements_errors_when_not_initialized() {
        let server = ResourceServer::new();
        let config = ResourceConfig {
            scheme: "cash".into(),
            network: NetworkPattern::exact("x402", "cash"),
            pay_to: "Alice".into(),
            price: serde_json::json!("$0.01"),
            max_timeout_seconds: None,
            extra: None,
        };
        assert!(server.build_payment_requirements(&config).is_err());
    }

    #[tokio::test]
    async fn test_verify_and_settle_payment_round_trip() {
        let server = initialized_server().await;
        let requirements = v2::PaymentRequirements {
            scheme: "cash".into(),
            network: ChainId::new("x402", "cash"),
            amount: "1".into(),
            pay_to: "Alice".into(),
            asset: "USD".into(),
            max_timeout_seconds: 300,
            extra: None,
        };
        let payload = v2::PaymentPayload {
            x402_version: V2,
            resource: None,
            accepted: requirements.clone(),
            payload: serde_json::json!({}),
            extensions: None,
        };
        let view_payload = PayloadView::V2(Box::new(payload));
        let view_requirements = RequirementsView::V2(requirements);

        let verified = server.verify_payment(&view_payload, &view_requirements).await.unwrap();
        assert!(verified.is_valid());

        let settled = server.settle_payment(&view_payload, &view_requirements).await.unwrap();
        assert!(settled.is_success());
    }
}
