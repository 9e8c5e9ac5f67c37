//! The `bazaar` extension: lets a facilitator build a discoverable catalog
//! of the resources it has verified payments for.
//!
//! A resource server declares discovery metadata for a resource in
//! `PaymentRequired.extensions["bazaar"]`; since extensions are echoed
//! verbatim from `PaymentRequired` into `PaymentPayload` (see
//! `x402_core::client::Client::assemble_payload`), that declaration is still
//! present on the payload a facilitator verifies. An after-verify hook built
//! by [`catalog_after_verify_hook`] reads it back out and records the
//! resource in a [`ResourceCatalog`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use x402_core::extensions::Extension;
use x402_core::hooks::{AfterVerifyHook, PayloadView, VerifyResultContext};
use x402_core::proto::{Extensions, VerifyResponse};

/// This extension's key in `PaymentRequired.extensions` / `PaymentPayload.extensions`.
pub const BAZAAR: &str = "bazaar";

/// Discovery metadata a resource server attaches to a priced resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryInfo {
    /// Canonical URL of the resource.
    pub resource: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// `Extension` registration for `bazaar`.
///
/// Carries the static declaration a resource server attaches for a given
/// resource; `enrich_declaration` is the default passthrough since the
/// declaration is fixed at construction time, not per-request.
#[derive(Debug, Clone, Default)]
pub struct BazaarExtension;

impl Extension for BazaarExtension {
    fn key(&self) -> &str {
        BAZAAR
    }
}

/// Builds the `PaymentRequired.extensions["bazaar"]` declaration for a resource.
#[must_use]
pub fn declare_bazaar_extension(info: &DiscoveryInfo) -> Value {
    serde_json::to_value(info).expect("DiscoveryInfo always serializes")
}

/// Extracts a resource's discovery info from a payload's echoed extensions.
#[must_use]
pub fn extract_discovery_info(extensions: Option<&Extensions>) -> Option<DiscoveryInfo> {
    serde_json::from_value(extensions?.get(BAZAAR)?.clone()).ok()
}

/// An entry in the facilitator's resource catalog, as served by a
/// `GET /discovery/resources` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResource {
    /// Always `"http"`: the transport this catalog entry was discovered over.
    #[serde(rename = "type")]
    pub kind: String,
    /// The protocol version the resource's `PaymentRequired` declared.
    pub x402_version: u8,
    /// Canonical URL of the resource.
    pub resource: String,
    /// Human-readable description, if the resource server supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource response, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Payment construction style of the requirement that was verified.
    pub scheme: String,
    /// Network identifier of the requirement that was verified.
    pub network: String,
    /// The verified payment requirement, serialized.
    pub accepts: Value,
    /// Unix timestamp (seconds) this entry was last refreshed, supplied by
    /// the caller since the extension crate has no clock dependency.
    pub last_updated: i64,
}

/// An in-memory catalog of discovered resources.
///
/// A flat `Vec` behind a `RwLock`, scanned linearly by
/// [`ResourceCatalog::list`]'s pagination: the catalog is expected to hold at
/// most a few thousand entries, where a `HashMap` keyed by resource URL would
/// save nothing but complexity.
#[derive(Default)]
pub struct ResourceCatalog {
    resources: parking_lot::RwLock<Vec<CatalogResource>>,
}

impl std::fmt::Debug for ResourceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCatalog").field("len", &self.resources.read().len()).finish()
    }
}

impl ResourceCatalog {
    /// Builds an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records or replaces a resource, keyed by `(resource, scheme, network)`.
    pub fn add(&self, resource: CatalogResource) {
        let mut resources = self.resources.write();
        if let Some(existing) =
            resources.iter_mut().find(|r| r.resource == resource.resource && r.scheme == resource.scheme && r.network == resource.network)
        {
            *existing = resource;
        } else {
            resources.push(resource);
        }
    }

    /// Returns a page of resources (`offset..offset+limit`) plus the total
    /// count, for `{items, pagination: {limit, offset, total}}` responses.
    #[must_use]
    pub fn list(&self, limit: usize, offset: usize) -> (Vec<CatalogResource>, usize) {
        let resources = self.resources.read();
        let total = resources.len();
        let page = resources.iter().skip(offset).take(limit).cloned().collect();
        (page, total)
    }
}

fn payload_extensions(payload: &PayloadView) -> Option<&Extensions> {
    match payload {
        PayloadView::V1(_) => None,
        PayloadView::V2(payload) => payload.extensions.as_ref(),
    }
}

/// Builds an [`AfterVerifyHook`] that records the resource a payload
/// declared discovery info for into `catalog`, whenever verification
/// succeeds. Payloads with no `bazaar` declaration (or v1 payloads, which
/// carry no extensions at all) are ignored.
#[must_use]
pub fn catalog_after_verify_hook(catalog: std::sync::Arc<ResourceCatalog>, now: impl Fn() -> i64 + Send + Sync + 'static) -> AfterVerifyHook {
    Box::new(move |ctx: &VerifyResultContext| {
        let catalog = catalog.clone();
        let last_updated = now();
        let discovery = payload_extensions(&ctx.payload).and_then(extract_discovery_info);
        let scheme = ctx.requirements.scheme().to_string();
        let network = ctx.requirements.network();
        let accepts = match &ctx.requirements {
            x402_core::hooks::RequirementsView::V1(r) => serde_json::to_value(r),
            x402_core::hooks::RequirementsView::V2(r) => serde_json::to_value(r),
        }
        .unwrap_or(Value::Null);
        let x402_version = match &ctx.payload {
            PayloadView::V1(_) => 1,
            PayloadView::V2(_) => 2,
        };
        let verified = matches!(ctx.result, VerifyResponse::Valid { .. });
        Box::pin(async move {
            let Some(discovery) = discovery else { return };
            if !verified {
                return;
            }
            catalog.add(CatalogResource {
                kind: "http".to_string(),
                x402_version,
                resource: discovery.resource,
                description: discovery.description,
                mime_type: discovery.mime_type,
                scheme,
                network,
                accepts,
                last_updated,
            });
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements() -> x402_core::hooks::RequirementsView {
        x402_core::hooks::RequirementsView::V2(x402_core::proto::v2::PaymentRequirements {
            scheme: "exact".to_string(),
            network: "eip155:8453".parse().unwrap(),
            amount: "1000".to_string(),
            pay_to: "0xabc".to_string(),
            asset: "0xusdc".to_string(),
            max_timeout_seconds: 60,
            extra: None,
        })
    }

    #[test]
    fn test_declare_and_extract_discovery_info_roundtrip() {
        let info = DiscoveryInfo { resource: "https://api.example.com/forecast".to_string(), description: Some("7-day forecast".to_string()), mime_type: Some("application/json".to_string()) };
        let mut extensions = Extensions::new();
        extensions.insert(BAZAAR.to_string(), declare_bazaar_extension(&info));

        let extracted = extract_discovery_info(Some(&extensions)).unwrap();
        assert_eq!(extracted.resource, info.resource);
    }

    fn sample_entry(resource: String, last_updated: i64) -> CatalogResource {
        CatalogResource {
            kind: "http".to_string(),
            x402_version: 2,
            resource,
            description: None,
            mime_type: None,
            scheme: "exact".to_string(),
            network: "eip155:8453".to_string(),
            accepts: serde_json::to_value(requirements_v2()).unwrap(),
            last_updated,
        }
    }

    #[test]
    fn test_catalog_add_replaces_existing_entry_for_same_resource_and_network() {
        let catalog = ResourceCatalog::new();
        let entry = sample_entry("https://api.example.com/forecast".to_string(), 100);
        catalog.add(entry.clone());
        catalog.add(CatalogResource { last_updated: 200, ..entry });

        let (items, total) = catalog.list(10, 0);
        assert_eq!(total, 1);
        assert_eq!(items[0].last_updated, 200);
    }

    #[test]
    fn test_catalog_list_paginates() {
        let catalog = ResourceCatalog::new();
        for i in 0..5 {
            catalog.add(sample_entry(format!("https://api.example.com/resource/{i}"), i));
        }

        let (page, total) = catalog.list(2, 2);
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].last_updated, 2);
    }

    #[tokio::test]
    async fn test_after_verify_hook_registers_resource_on_success() {
        let catalog = std::sync::Arc::new(ResourceCatalog::new());
        let hook = catalog_after_verify_hook(catalog.clone(), || 1_700_000_000);

        let info = DiscoveryInfo { resource: "https://api.example.com/forecast".to_string(), description: None, mime_type: None };
        let mut extensions = Extensions::new();
        extensions.insert(BAZAAR.to_string(), declare_bazaar_extension(&info));

        let payload = x402_core::proto::v2::PaymentPayload {
            x402_version: x402_core::proto::version::V2,
            resource: None,
            accepted: requirements_v2(),
            payload: serde_json::json!({}),
            extensions: Some(extensions),
        };

        let ctx = VerifyResultContext {
            payload: PayloadView::V2(Box::new(payload)),
            requirements: requirements(),
            result: VerifyResponse::Valid { payer: "0xabc".to_string() },
        };

        hook(&ctx).await;

        let (items, total) = catalog.list(10, 0);
        assert_eq!(total, 1);
        assert_eq!(items[0].resource, "https://api.example.com/forecast");
    }

    fn requirements_v2() -> x402_core::proto::v2::PaymentRequirements {
        match requirements() {
            x402_core::hooks::RequirementsView::V2(r) => r,
            x402_core::hooks::RequirementsView::V1(_) => unreachable!(),
        }
    }
}
