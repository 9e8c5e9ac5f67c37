//! Axum route handlers for the facilitator HTTP service.
//!
//! Corresponds to the facilitator HTTP API defined by the x402 protocol:
//! `/supported`, `/verify`, `/settle`, plus a `bazaar` discovery endpoint
//! backed by [`ResourceCatalog`].

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use x402_core::facilitator::Facilitator;
use x402_core::hooks::{PayloadView, RequirementsView};
use x402_core::proto::{SettleResponse, SupportedResponse, VerifyResponse, v1, v2};
use x402_extensions::bazaar::{CatalogResource, ResourceCatalog};

use crate::error::FacilitatorError;

/// Shared application state for the facilitator HTTP service.
#[derive(Clone)]
pub struct FacilitatorState {
    /// The verify/settle engine.
    pub facilitator: Arc<Facilitator>,
    /// Discovery catalog populated by the `bazaar` after-verify hook.
    pub catalog: Arc<ResourceCatalog>,
}

/// Wire body for `/verify` and `/settle`: carries the protocol version
/// alongside the raw payload/requirements JSON so the right concrete
/// v1/v2 type can be picked before decoding.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequestBody {
    /// The protocol version the payload/requirements were encoded in.
    pub x402_version: u8,
    /// The payment payload, encoded per `x402_version`.
    pub payment_payload: serde_json::Value,
    /// The payment requirements the payload is being checked against.
    pub payment_requirements: serde_json::Value,
}

fn decode_views(body: VerifyRequestBody) -> Result<(u8, PayloadView, RequirementsView), FacilitatorError> {
    match body.x402_version {
        1 => {
            let payload: v1::PaymentPayload = serde_json::from_value(body.payment_payload)?;
            let requirements: v1::PaymentRequirements = serde_json::from_value(body.payment_requirements)?;
            Ok((1, PayloadView::V1(payload), RequirementsView::V1(requirements)))
        }
        2 => {
            let payload: v2::PaymentPayload = serde_json::from_value(body.payment_payload)?;
            let requirements: v2::PaymentRequirements = serde_json::from_value(body.payment_requirements)?;
            Ok((2, PayloadView::V2(Box::new(payload)), RequirementsView::V2(requirements)))
        }
        other => Err(FacilitatorError::UnsupportedVersion(other)),
    }
}

/// `GET /supported` — returns the list of supported payment kinds.
pub async fn get_supported(State(state): State<FacilitatorState>) -> Json<SupportedResponse> {
    Json(state.facilitator.get_supported())
}

/// `POST /verify` — verifies a payment payload against the requirements it
/// claims to satisfy.
///
/// # Errors
///
/// Returns 400 if the body cannot be decoded or names an unsupported
/// `x402Version`.
pub async fn post_verify(State(state): State<FacilitatorState>, Json(body): Json<VerifyRequestBody>) -> Result<Json<VerifyResponse>, FacilitatorError> {
    let (version, payload, requirements) = decode_views(body)?;
    let result = state.facilitator.verify(version, &payload, &requirements).await;
    Ok(Json(result))
}

/// `POST /settle` — settles a previously verified payment payload.
///
/// # Errors
///
/// Returns 400 if the body cannot be decoded or names an unsupported
/// `x402Version`.
pub async fn post_settle(State(state): State<FacilitatorState>, Json(body): Json<VerifyRequestBody>) -> Result<Json<SettleResponse>, FacilitatorError> {
    let (version, payload, requirements) = decode_views(body)?;
    let result = state.facilitator.settle(version, &payload, &requirements).await;
    Ok(Json(result))
}

/// Query parameters for `GET /discovery/resources`.
#[derive(Debug, Deserialize)]
pub struct DiscoveryQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

const fn default_limit() -> usize {
    20
}

/// Pagination metadata echoed alongside a discovery page.
#[derive(Debug, Serialize)]
struct Pagination {
    limit: usize,
    offset: usize,
    total: usize,
}

/// Response body for `GET /discovery/resources`.
#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    items: Vec<CatalogResource>,
    pagination: Pagination,
}

/// `GET /discovery/resources` — lists resources this facilitator has
/// recorded a successful verification for, via the `bazaar` extension.
pub async fn get_discovery_resources(State(state): State<FacilitatorState>, Query(query): Query<DiscoveryQuery>) -> Json<DiscoveryResponse> {
    let (items, total) = state.catalog.list(query.limit, query.offset);
    Json(DiscoveryResponse { items, pagination: Pagination { limit: query.limit, offset: query.offset, total } })
}

/// Builds the `axum::Router` exposing every facilitator endpoint.
///
/// Endpoints:
/// - `GET /supported` — list supported payment kinds
/// - `POST /verify` — verify a payment payload
/// - `POST /settle` — settle a payment payload
/// - `GET /discovery/resources` — paginated `bazaar` resource catalog
#[must_use]
pub fn facilitator_router(state: FacilitatorState) -> axum::Router {
    axum::Router::new()
        .route("/supported", axum::routing::get(get_supported))
        .route("/verify", axum::routing::post(post_verify))
        .route("/settle", axum::routing::post(post_settle))
        .route("/discovery/resources", axum::routing::get(get_discovery_resources))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use x402_core::chain::ChainId;
    use x402_core::hooks::BoxFuture;
    use x402_core::proto::VerifyResponse as Verify;
    use x402_core::scheme::{FacilitatorScheme, SchemeError};

    struct AlwaysValidScheme;

    impl FacilitatorScheme for AlwaysValidScheme {
        fn scheme(&self) -> &str {
            "exact"
        }
        fn caip_family(&self) -> &str {
            "eip155"
        }
        fn verify<'a>(&'a self, _payload: &'a PayloadView, _requirements: &'a RequirementsView) -> BoxFuture<'a, Result<Verify, SchemeError>> {
            Box::pin(async { Ok(Verify::Valid { payer: "0xabc".into() }) })
        }
        fn settle<'a>(&'a self, _payload: &'a PayloadView, requirements: &'a RequirementsView) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
            let network = match requirements {
                RequirementsView::V2(r) => r.network.clone(),
                RequirementsView::V1(_) => ChainId::new("eip155", "8453"),
            };
            Box::pin(async move { Ok(SettleResponse::Success { payer: "0xabc".into(), transaction: "0xdead".into(), network }) })
        }
    }

    fn state() -> FacilitatorState {
        let mut facilitator = Facilitator::new();
        facilitator.register(2, vec![x402_core::chain::NetworkPattern::exact("eip155", "8453")], "exact", std::sync::Arc::new(AlwaysValidScheme));
        FacilitatorState { facilitator: Arc::new(facilitator), catalog: Arc::new(ResourceCatalog::new()) }
    }

    fn sample_requirements() -> v2::PaymentRequirements {
        v2::PaymentRequirements {
            scheme: "exact".into(),
            network: "eip155:8453".parse::<ChainId>().unwrap(),
            amount: "1000".into(),
            pay_to: "0xabc".into(),
            asset: "0xusdc".into(),
            max_timeout_seconds: 60,
            extra: None,
        }
    }

    #[tokio::test]
    async fn test_post_verify_returns_valid() {
        let router = facilitator_router(state());
        let requirements = sample_requirements();
        let payload = v2::PaymentPayload {
            x402_version: x402_core::proto::version::V2,
            resource: None,
            accepted: requirements.clone(),
            payload: serde_json::json!({}),
            extensions: None,
        };
        let body = serde_json::json!({
            "x402Version": 2,
            "paymentPayload": payload,
            "paymentRequirements": requirements,
        });

        let response = router
            .oneshot(Request::post("/verify").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_post_verify_rejects_unsupported_version() {
        let router = facilitator_router(state());
        let body = serde_json::json!({
            "x402Version": 9,
            "paymentPayload": {},
            "paymentRequirements": {},
        });

        let response = router
            .oneshot(Request::post("/verify").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_discovery_resources_empty_by_default() {
        let router = facilitator_router(state());
        let response = router.oneshot(Request::get("/discovery/resources").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
