//! Binds `(version, network pattern, scheme)` triples to concrete scheme
//! mechanisms. Shared substrate used by `Client`, `ResourceServer`, and
//! `Facilitator`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::{ChainId, NetworkPattern};
use crate::error::SchemeNotFoundError;
use crate::scheme::{ClientScheme, FacilitatorScheme, ServerScheme};

#[cfg(feature = "telemetry")]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => { tracing::$level!($($arg)*) };
}
#[cfg(not(feature = "telemetry"))]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => {{}};
}

struct Entry<M: ?Sized> {
    version: u8,
    pattern: NetworkPattern,
    scheme: String,
    mechanism: Arc<M>,
}

impl<M: ?Sized> Clone for Entry<M> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            pattern: self.pattern.clone(),
            scheme: self.scheme.clone(),
            mechanism: Arc::clone(&self.mechanism),
        }
    }
}

fn is_same_registration<M: ?Sized>(entry: &Entry<M>, version: u8, pattern: &NetworkPattern, scheme: &str) -> bool {
    entry.version == version && entry.scheme == scheme && entry.pattern.to_string() == pattern.to_string()
}

fn best_match<'a, M: ?Sized>(entries: &'a [Entry<M>], version: u8, network: &ChainId, scheme: &str) -> Option<&'a Arc<M>> {
    entries
        .iter()
        .filter(|e| e.version == version && e.scheme == scheme && e.pattern.matches(network))
        .min_by_key(|e| e.pattern.specificity())
        .map(|e| &e.mechanism)
}

fn all_matches<'a, M: ?Sized>(
    entries: &'a [Entry<M>],
    version: u8,
    network: &ChainId,
) -> HashMap<String, &'a Arc<M>> {
    let mut best: HashMap<String, (&Entry<M>, usize)> = HashMap::new();
    for (index, entry) in entries.iter().enumerate() {
        if entry.version != version || !entry.pattern.matches(network) {
            continue;
        }
        let candidate_rank = entry.pattern.specificity();
        match best.get(&entry.scheme) {
            Some((current, _)) if current.pattern.specificity() <= candidate_rank => {}
            _ => {
                best.insert(entry.scheme.clone(), (entry, index));
            }
        }
    }
    best.into_iter().map(|(scheme, (entry, _))| (scheme, &entry.mechanism)).collect()
}

/// The (version, network-pattern, scheme) → mechanism registry.
///
/// Registration is expected to happen at construction time; lookups assume
/// the registry is quiescent afterward (see the concurrency notes in
/// `crate::server::ResourceServer::initialize`).
#[derive(Default)]
pub struct MechanismRegistry {
    client: Vec<Entry<dyn ClientScheme>>,
    server: Vec<Entry<dyn ServerScheme>>,
    facilitator: Vec<Entry<dyn FacilitatorScheme>>,
}

impl MechanismRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client mechanism against one or more network patterns,
    /// at the given protocol version. Re-registering the same `(version,
    /// pattern, scheme)` triple replaces the prior entry.
    pub fn register_client(
        &mut self,
        version: u8,
        patterns: impl Into<Vec<NetworkPattern>>,
        scheme: impl Into<String>,
        mechanism: Arc<dyn ClientScheme>,
    ) {
        let scheme = scheme.into();
        for pattern in patterns.into() {
            self.client.retain(|e| !is_same_registration(e, version, &pattern, &scheme));
            traced!(debug, version, %pattern, %scheme, "registered client mechanism");
            self.client.push(Entry { version, pattern, scheme: scheme.clone(), mechanism: Arc::clone(&mechanism) });
        }
    }

    /// Registers a server mechanism. See [`Self::register_client`].
    pub fn register_server(
        &mut self,
        version: u8,
        patterns: impl Into<Vec<NetworkPattern>>,
        scheme: impl Into<String>,
        mechanism: Arc<dyn ServerScheme>,
    ) {
        let scheme = scheme.into();
        for pattern in patterns.into() {
            self.server.retain(|e| !is_same_registration(e, version, &pattern, &scheme));
            traced!(debug, version, %pattern, %scheme, "registered server mechanism");
            self.server.push(Entry { version, pattern, scheme: scheme.clone(), mechanism: Arc::clone(&mechanism) });
        }
    }

    /// Registers a facilitator mechanism. See [`Self::register_client`].
    pub fn register_facilitator(
        &mut self,
        version: u8,
        patterns: impl Into<Vec<NetworkPattern>>,
        scheme: impl Into<String>,
        mechanism: Arc<dyn FacilitatorScheme>,
    ) {
        let scheme = scheme.into();
        for pattern in patterns.into() {
            self.facilitator.retain(|e| !is_same_registration(e, version, &pattern, &scheme));
            traced!(debug, version, %pattern, %scheme, "registered facilitator mechanism");
            self.facilitator.push(Entry { version, pattern, scheme: scheme.clone(), mechanism: Arc::clone(&mechanism) });
        }
    }

    /// The client mechanism for `(version, network, scheme)`, most specific
    /// matching registration wins.
    #[must_use]
    pub fn client_mechanism(&self, version: u8, network: &ChainId, scheme: &str) -> Option<Arc<dyn ClientScheme>> {
        let found = best_match(&self.client, version, network, scheme).map(Arc::clone);
        if found.is_none() {
            traced!(debug, version, %network, scheme, "client mechanism lookup miss");
        }
        found
    }

    /// The server mechanism for `(version, network, scheme)`.
    #[must_use]
    pub fn server_mechanism(&self, version: u8, network: &ChainId, scheme: &str) -> Option<Arc<dyn ServerScheme>> {
        let found = best_match(&self.server, version, network, scheme).map(Arc::clone);
        if found.is_none() {
            traced!(debug, version, %network, scheme, "server mechanism lookup miss");
        }
        found
    }

    /// The facilitator mechanism for `(version, network, scheme)`.
    #[must_use]
    pub fn facilitator_mechanism(&self, version: u8, network: &ChainId, scheme: &str) -> Option<Arc<dyn FacilitatorScheme>> {
        let found = best_match(&self.facilitator, version, network, scheme).map(Arc::clone);
        if found.is_none() {
            traced!(debug, version, %network, scheme, "facilitator mechanism lookup miss");
        }
        found
    }

    /// The facilitator mechanism for `(version, network, scheme)`, or a
    /// [`SchemeNotFoundError`] naming the lookup key.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeNotFoundError`] if no registration matches.
    pub fn require_facilitator_mechanism(
        &self,
        version: u8,
        network: &ChainId,
        scheme: &str,
    ) -> Result<Arc<dyn FacilitatorScheme>, SchemeNotFoundError> {
        self.facilitator_mechanism(version, network, scheme)
            .ok_or_else(|| SchemeNotFoundError::new(version, network.to_string(), Some(scheme.to_string())))
    }

    /// All client mechanisms matching `(version, network)`, keyed by scheme
    /// name, with the most specific registration winning ties per scheme.
    #[must_use]
    pub fn client_mechanisms_by_network(&self, version: u8, network: &ChainId) -> HashMap<String, Arc<dyn ClientScheme>> {
        all_matches(&self.client, version, network)
            .into_iter()
            .map(|(scheme, mechanism)| (scheme, Arc::clone(mechanism)))
            .collect()
    }

    /// All server mechanisms matching `(version, network)`, keyed by scheme name.
    #[must_use]
    pub fn server_mechanisms_by_network(&self, version: u8, network: &ChainId) -> HashMap<String, Arc<dyn ServerScheme>> {
        all_matches(&self.server, version, network)
            .into_iter()
            .map(|(scheme, mechanism)| (scheme, Arc::clone(mechanism)))
            .collect()
    }

    /// Every registered facilitator entry, for `Facilitator::get_supported`.
    pub(crate) fn facilitator_entries(&self) -> impl Iterator<Item = (u8, &NetworkPattern, &str, &Arc<dyn FacilitatorScheme>)> {
        self.facilitator.iter().map(|e| (e.version, &e.pattern, e.scheme.as_str(), &e.mechanism))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{BoxFuture, PayloadView, RequirementsView};
    use crate::proto::{SettleResponse, VerifyResponse};
    use crate::scheme::SchemeError;

    struct MockFacilitator;

    impl FacilitatorScheme for MockFacilitator {
        fn scheme(&self) -> &str {
            "exact"
        }
        fn caip_family(&self) -> &str {
            "eip155"
        }
        fn verify<'a>(
            &'a self,
            _payload: &'a PayloadView,
            _requirements: &'a RequirementsView,
        ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
            Box::pin(async { Ok(VerifyResponse::Valid { payer: "0xabc".into() }) })
        }
        fn settle<'a>(
            &'a self,
            _payload: &'a PayloadView,
            _requirements: &'a RequirementsView,
        ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
            Box::pin(async {
                Ok(SettleResponse::Success {
                    payer: "0xabc".into(),
                    transaction: "0xdead".into(),
                    network: ChainId::new("eip155", "8453"),
                })
            })
        }
    }

    #[test]
    fn test_s6_wildcard_registration_matches_family_not_other() {
        let mut registry = MechanismRegistry::new();
        registry.register_facilitator(2, vec![NetworkPattern::wildcard("eip155")], "exact", Arc::new(MockFacilitator));

        assert!(registry.facilitator_mechanism(2, &ChainId::new("eip155", "8453"), "exact").is_some());
        assert!(registry.facilitator_mechanism(2, &ChainId::new("solana", "mainnet"), "exact").is_none());
    }

    #[test]
    fn test_exact_beats_wildcard() {
        let mut registry = MechanismRegistry::new();
        registry.register_facilitator(2, vec![NetworkPattern::wildcard("eip155")], "exact", Arc::new(MockFacilitator));
        registry.register_facilitator(
            2,
            vec![NetworkPattern::exact("eip155", "8453")],
            "exact",
            Arc::new(MockFacilitator),
        );

        let matched = registry.client_mechanisms_by_network(2, &ChainId::new("eip155", "8453"));
        assert!(matched.is_empty()); // client registry untouched in this test

        let found = registry.facilitator_mechanism(2, &ChainId::new("eip155", "8453"), "exact");
        assert!(found.is_some());
    }

    #[test]
    fn test_reregistering_same_triple_replaces() {
        let mut registry = MechanismRegistry::new();
        let pattern = NetworkPattern::exact("eip155", "8453");
        registry.register_facilitator(2, vec![pattern.clone()], "exact", Arc::new(MockFacilitator));
        registry.register_facilitator(2, vec![pattern], "exact", Arc::new(MockFacilitator));
        assert_eq!(registry.facilitator_entries().count(), 1);
    }

    #[test]
    fn test_require_facilitator_mechanism_scheme_not_found() {
        let registry = MechanismRegistry::new();
        let error = registry
            .require_facilitator_mechanism(2, &ChainId::new("eip155", "8453"), "exact")
            .unwrap_err();
        assert_eq!(error.version, 2);
    }
}
