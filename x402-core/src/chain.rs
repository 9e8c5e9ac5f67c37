//! CAIP-2 chain identifiers and network-pattern matching.
//!
//! - [`ChainId`] — a CAIP-2 `namespace:reference` identifier (e.g. `eip155:8453`).
//! - [`NetworkPattern`] — exact, family-wildcard, or set matching over chain IDs.
//! - [`NetworkRegistry`] — maps legacy v1 network aliases (`"base-sepolia"`) to
//!   [`ChainId`] and back.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// A CAIP-2 compliant blockchain identifier: `namespace:reference`.
///
/// `namespace` identifies the chain family (`eip155`, `solana`, `hypercore`);
/// `reference` identifies a specific chain within that family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainId {
    namespace: String,
    reference: String,
}

impl ChainId {
    /// Builds a chain ID from its namespace and reference components.
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// The namespace component (e.g. `"eip155"`).
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The reference component (e.g. `"8453"`).
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Consumes `self`, returning the `(namespace, reference)` parts.
    #[must_use]
    pub fn into_parts(self) -> (String, String) {
        (self.namespace, self.reference)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_string()
    }
}

/// Raised when a string does not parse as `namespace:reference`.
#[derive(Debug, thiserror::Error)]
#[error("invalid chain id format: {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s.split_once(':').ok_or_else(|| ChainIdFormatError(s.into()))?;
        if namespace.is_empty() || reference.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        Ok(Self::new(namespace, reference))
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// A pattern over [`ChainId`]s, as used by mechanism registration and lookup.
///
/// - `Exact` matches one chain.
/// - `Wildcard` (`eip155:*`) matches every chain in a namespace.
/// - `Set` (`eip155:{1,8453,137}`) matches a fixed list of references in a namespace.
///
/// Specificity for registry lookup purposes is `Exact` > `Set` > `Wildcard`,
/// with the universal pattern `*:*` (namespace `"*"`) ranking below all
/// namespace-scoped wildcards.
#[derive(Debug, Clone)]
pub enum NetworkPattern {
    /// Matches exactly one chain.
    Exact {
        /// Chain namespace.
        namespace: String,
        /// Chain reference.
        reference: String,
    },
    /// Matches any chain whose reference is in `references`, within `namespace`.
    Set {
        /// Chain namespace.
        namespace: String,
        /// Allowed references.
        references: HashSet<String>,
    },
    /// Matches any chain in `namespace` (or, if `namespace == "*"`, any chain at all).
    Wildcard {
        /// Chain namespace, or `"*"` for the universal pattern.
        namespace: String,
    },
}

/// Specificity tier used to break ties when multiple registered patterns
/// match the same chain id; lower sorts more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    /// `namespace:reference`
    Exact,
    /// `namespace:{a,b,c}`
    Set,
    /// `namespace:*`
    NamespaceWildcard,
    /// `*:*`
    Universal,
}

impl NetworkPattern {
    /// An exact pattern matching only `chain_id`.
    pub fn exact<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self::Exact {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// A wildcard pattern matching any reference within `namespace`.
    pub fn wildcard<N: Into<String>>(namespace: N) -> Self {
        Self::Wildcard {
            namespace: namespace.into(),
        }
    }

    /// The universal pattern, matching any chain id at all.
    #[must_use]
    pub fn universal() -> Self {
        Self::Wildcard {
            namespace: "*".to_string(),
        }
    }

    /// A set pattern matching any of `references` within `namespace`.
    pub fn set<N: Into<String>>(namespace: N, references: HashSet<String>) -> Self {
        Self::Set {
            namespace: namespace.into(),
            references,
        }
    }

    /// Whether `chain_id` matches this pattern.
    #[must_use]
    pub fn matches(&self, chain_id: &ChainId) -> bool {
        match self {
            Self::Exact { namespace, reference } => {
                chain_id.namespace == *namespace && chain_id.reference == *reference
            }
            Self::Set { namespace, references } => {
                chain_id.namespace == *namespace && references.contains(&chain_id.reference)
            }
            Self::Wildcard { namespace } => namespace == "*" || chain_id.namespace == *namespace,
        }
    }

    /// Namespace this pattern is scoped to (`"*"` for the universal pattern).
    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Exact { namespace, .. } | Self::Set { namespace, .. } | Self::Wildcard { namespace } => namespace,
        }
    }

    /// Specificity tier, used to rank competing matches during lookup.
    #[must_use]
    pub fn specificity(&self) -> Specificity {
        match self {
            Self::Exact { .. } => Specificity::Exact,
            Self::Set { .. } => Specificity::Set,
            Self::Wildcard { namespace } if namespace == "*" => Specificity::Universal,
            Self::Wildcard { .. } => Specificity::NamespaceWildcard,
        }
    }
}

impl fmt::Display for NetworkPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact { namespace, reference } => write!(f, "{namespace}:{reference}"),
            Self::Set { namespace, references } => {
                let mut refs: Vec<&str> = references.iter().map(String::as_str).collect();
                refs.sort_unstable();
                write!(f, "{}:{{{}}}", namespace, refs.join(","))
            }
            Self::Wildcard { namespace } => write!(f, "{namespace}:*"),
        }
    }
}

impl FromStr for NetworkPattern {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, rest) = s.split_once(':').ok_or_else(|| ChainIdFormatError(s.into()))?;
        if namespace.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        if rest == "*" {
            return Ok(Self::wildcard(namespace));
        }
        if let Some(inner) = rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            let references: HashSet<String> = inner
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect();
            if references.is_empty() {
                return Err(ChainIdFormatError(s.into()));
            }
            return Ok(Self::set(namespace, references));
        }
        if rest.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        Ok(Self::exact(namespace, rest))
    }
}

impl Serialize for NetworkPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NetworkPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

impl From<ChainId> for NetworkPattern {
    fn from(chain_id: ChainId) -> Self {
        let (namespace, reference) = chain_id.into_parts();
        Self::exact(namespace, reference)
    }
}

impl From<&ChainId> for NetworkPattern {
    fn from(chain_id: &ChainId) -> Self {
        Self::exact(chain_id.namespace.clone(), chain_id.reference.clone())
    }
}

/// A known v1 network alias and its CAIP-2 chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Legacy v1 alias (e.g. `"base-sepolia"`).
    pub name: &'static str,
    /// CAIP-2 namespace.
    pub namespace: &'static str,
    /// CAIP-2 reference.
    pub reference: &'static str,
}

impl NetworkInfo {
    /// The [`ChainId`] this alias resolves to.
    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        ChainId::new(self.namespace, self.reference)
    }
}

/// Bidirectional map between legacy v1 network aliases and CAIP-2 [`ChainId`]s.
///
/// `x402-core` ships empty; mechanism crates (`x402-evm`, `x402-svm`) each
/// expose a `NetworkInfo` slice of their known networks, and applications
/// assemble a full registry at startup via [`NetworkRegistry::with_networks`].
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    name_to_chain_id: HashMap<&'static str, ChainId>,
    chain_id_to_name: HashMap<ChainId, &'static str>,
}

impl NetworkRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated from a `NetworkInfo` slice.
    #[must_use]
    pub fn from_networks(networks: &[NetworkInfo]) -> Self {
        let mut registry = Self::new();
        registry.register(networks);
        registry
    }

    /// Registers additional networks in place.
    pub fn register(&mut self, networks: &[NetworkInfo]) {
        for info in networks {
            self.name_to_chain_id.insert(info.name, info.chain_id());
            self.chain_id_to_name.insert(info.chain_id(), info.name);
        }
    }

    /// Builder-style: registers additional networks and returns `self`.
    #[must_use]
    pub fn with_networks(mut self, networks: &[NetworkInfo]) -> Self {
        self.register(networks);
        self
    }

    /// Resolves a v1 alias to its [`ChainId`].
    #[must_use]
    pub fn chain_id_by_name(&self, name: &str) -> Option<&ChainId> {
        self.name_to_chain_id.get(name)
    }

    /// Resolves a [`ChainId`] back to its v1 alias, if known.
    #[must_use]
    pub fn name_by_chain_id(&self, chain_id: &ChainId) -> Option<&'static str> {
        self.chain_id_to_name.get(chain_id).copied()
    }

    /// Number of registered aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.name_to_chain_id.len()
    }

    /// True if no aliases are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name_to_chain_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_serialize_eip155() {
        let chain_id = ChainId::new("eip155", "1");
        assert_eq!(serde_json::to_string(&chain_id).unwrap(), "\"eip155:1\"");
    }

    #[test]
    fn test_chain_id_roundtrip() {
        let original = ChainId::new("solana", "devnet");
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: ChainId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_chain_id_deserialize_invalid_format() {
        let result: Result<ChainId, _> = serde_json::from_str("\"invalid\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_pattern_exact_matches() {
        let pattern = NetworkPattern::exact("eip155", "8453");
        assert!(pattern.matches(&ChainId::new("eip155", "8453")));
        assert!(!pattern.matches(&ChainId::new("eip155", "1")));
    }

    #[test]
    fn test_pattern_wildcard_matches_family() {
        let pattern = NetworkPattern::wildcard("eip155");
        assert!(pattern.matches(&ChainId::new("eip155", "1")));
        assert!(pattern.matches(&ChainId::new("eip155", "8453")));
        assert!(!pattern.matches(&ChainId::new("solana", "mainnet")));
    }

    #[test]
    fn test_pattern_universal_matches_anything() {
        let pattern = NetworkPattern::universal();
        assert!(pattern.matches(&ChainId::new("eip155", "1")));
        assert!(pattern.matches(&ChainId::new("solana", "mainnet")));
    }

    #[test]
    fn test_pattern_set_matches() {
        let refs: HashSet<String> = ["1", "8453", "137"].into_iter().map(String::from).collect();
        let pattern = NetworkPattern::set("eip155", refs);
        assert!(pattern.matches(&ChainId::new("eip155", "8453")));
        assert!(!pattern.matches(&ChainId::new("eip155", "42")));
    }

    #[test]
    fn test_pattern_parse_forms() {
        assert!(matches!("eip155:*".parse::<NetworkPattern>().unwrap(), NetworkPattern::Wildcard { .. }));
        assert!(matches!("eip155:8453".parse::<NetworkPattern>().unwrap(), NetworkPattern::Exact { .. }));
        assert!(matches!("eip155:{1,2,3}".parse::<NetworkPattern>().unwrap(), NetworkPattern::Set { .. }));
    }

    #[test]
    fn test_specificity_ordering() {
        assert!(Specificity::Exact < Specificity::Set);
        assert!(Specificity::Set < Specificity::NamespaceWildcard);
        assert!(Specificity::NamespaceWildcard < Specificity::Universal);
    }

    #[test]
    fn test_network_registry_roundtrip() {
        const NETWORKS: &[NetworkInfo] = &[NetworkInfo { name: "base", namespace: "eip155", reference: "8453" }];
        let registry = NetworkRegistry::from_networks(NETWORKS);
        let chain_id = registry.chain_id_by_name("base").unwrap();
        assert_eq!(chain_id, &ChainId::new("eip155", "8453"));
        assert_eq!(registry.name_by_chain_id(chain_id), Some("base"));
    }
}
