//! `tower`/`axum` middleware that gates an inner service behind
//! [`x402_core::server::ResourceServer`].
//!
//! [`PaymentGateLayer`] inspects each request against a table of route
//! patterns; routes with no matching entry pass straight through. A matched
//! route with no `PAYMENT-SIGNATURE` header gets a 402 response carrying the
//! route's priced `PaymentRequirements`. A matched route with a payload is
//! verified and, once the inner service has served the resource, settled —
//! with the settlement result attached as a `PAYMENT-RESPONSE` header.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::body::Body;
use http::{Request, Response, StatusCode};
use tower::{Layer, Service};
use x402_core::config::ResourceConfig;
use x402_core::hooks::{PayloadView, RequirementsView};
use x402_core::proto::v2;
use x402_core::server::ResourceServer;

use crate::constants::{ACCESS_CONTROL_EXPOSE_HEADERS, PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER, PAYMENT_SIGNATURE_HEADER};
use crate::headers::{decode_payment_payload, encode_payment_required, encode_settle_response};
use crate::types::{CompiledRoute, RouteConfig, parse_route_pattern};

#[cfg(feature = "telemetry")]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => { tracing::$level!($($arg)*) };
}
#[cfg(not(feature = "telemetry"))]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => {{}};
}

/// Route configuration map: pattern (e.g. `"GET /weather"` or `"/api/*"`) →
/// [`RouteConfig`].
pub type RoutesConfig = HashMap<String, RouteConfig>;

/// `tower` [`Layer`] adding x402 payment gating to an inner service.
#[derive(Clone)]
pub struct PaymentGateLayer {
    shared: Arc<PaymentGateShared>,
}

struct PaymentGateShared {
    server: Arc<ResourceServer>,
    compiled_routes: Vec<CompiledRoute>,
}

impl PaymentGateLayer {
    /// Builds a layer from an initialized [`ResourceServer`] and a route
    /// table.
    #[must_use]
    pub fn new(server: Arc<ResourceServer>, routes: RoutesConfig) -> Self {
        let compiled_routes = routes
            .into_iter()
            .map(|(pattern, config)| {
                let (method, path_pattern) = parse_route_pattern(&pattern);
                CompiledRoute { method, path_pattern, config }
            })
            .collect();

        Self { shared: Arc::new(PaymentGateShared { server, compiled_routes }) }
    }
}

impl<S> Layer<S> for PaymentGateLayer {
    type Service = PaymentGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentGateService { inner, shared: Arc::clone(&self.shared) }
    }
}

/// `tower` [`Service`] enforcing x402 payment requirements. Constructed by
/// [`PaymentGateLayer`].
#[derive(Clone)]
pub struct PaymentGateService<S> {
    inner: S,
    shared: Arc<PaymentGateShared>,
}

impl<S> Service<Request<Body>> for PaymentGateService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send,
{
    type Response = Response<Body>;
    type Error = Box<dyn std::error::Error + Send + Sync>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let shared = Arc::clone(&self.shared);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let method = req.method().as_str().to_uppercase();
            let path = req.uri().path().to_owned();

            let Some(route) = shared.compiled_routes.iter().find(|r| r.matches(&method, &path)) else {
                return inner.call(req).await.map_err(Into::into);
            };

            let resource = v2::ResourceInfo {
                url: route.config.resource.clone().unwrap_or_else(|| path.clone()),
                description: route.config.description.clone().unwrap_or_default(),
                mime_type: route.config.mime_type.clone().unwrap_or_default(),
            };

            let accepts = match build_requirements(&shared.server, &route.config) {
                Ok(accepts) => accepts,
                Err(error) => return Ok(error_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())),
            };

            let extensions = route.config.extensions.clone();

            let Some(header_value) = req.headers().get(PAYMENT_SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
                return Ok(payment_required_response(&shared.server, accepts, resource, None, extensions));
            };

            let payload = match decode_payment_payload(header_value) {
                Ok(PayloadView::V2(payload)) => *payload,
                Ok(PayloadView::V1(_)) | Err(_) => {
                    return Ok(payment_required_response(
                        &shared.server,
                        accepts,
                        resource,
                        Some("unsupported payload version".to_owned()),
                        extensions,
                    ));
                }
            };

            let Some(matched) = shared.server.find_matching_requirements(&accepts, &payload).cloned() else {
                return Ok(payment_required_response(&shared.server, accepts, resource, Some("no matching payment requirements".to_owned()), extensions));
            };

            let view_payload = PayloadView::V2(Box::new(payload));
            let view_requirements = RequirementsView::V2(matched);

            match shared.server.verify_payment(&view_payload, &view_requirements).await {
                Ok(result) if result.is_valid() => {
                    let mut response = inner.call(req).await.map_err(Into::into)?;
                    traced!(debug, path = %path, "settling payment after request execution");
                    settle_and_attach_header(&shared.server, &view_payload, &view_requirements, &mut response).await;
                    Ok(response)
                }
                Ok(_) => Ok(payment_required_response(&shared.server, accepts, resource, Some("payment verification failed".to_owned()), extensions)),
                Err(error) => {
                    traced!(warn, path = %path, %error, "payment verification errored");
                    Ok(payment_required_response(&shared.server, accepts, resource, Some(error.to_string()), extensions))
                }
            }
        })
    }
}

fn build_requirements(server: &ResourceServer, route_config: &RouteConfig) -> Result<Vec<v2::PaymentRequirements>, x402_core::scheme::SchemeError> {
    let mut all = Vec::new();
    for option in &route_config.accepts {
        let config = ResourceConfig {
            scheme: option.scheme.clone(),
            network: option.network.parse()?,
            pay_to: option.pay_to.clone(),
            price: option.price.clone(),
            max_timeout_seconds: option.max_timeout_seconds,
            extra: option.extra.clone(),
        };
        all.extend(server.build_payment_requirements(&config)?);
    }
    Ok(all)
}

fn payment_required_response(
    server: &ResourceServer,
    accepts: Vec<v2::PaymentRequirements>,
    resource: v2::ResourceInfo,
    error: Option<String>,
    extensions: Option<HashMap<String, serde_json::Value>>,
) -> Response<Body> {
    let required = server.create_payment_required_response(accepts, resource, error, extensions);
    let body_json = serde_json::to_string(&required).unwrap_or_default();
    let encoded = encode_payment_required(&x402_core::hooks::PaymentRequiredView::V2(required)).unwrap_or_default();

    Response::builder()
        .status(StatusCode::PAYMENT_REQUIRED)
        .header(PAYMENT_REQUIRED_HEADER, &encoded)
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(ACCESS_CONTROL_EXPOSE_HEADERS, PAYMENT_REQUIRED_HEADER)
        .body(Body::from(body_json))
        .expect("valid 402 response")
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    let body = serde_json::json!({ "error": message });
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid error response")
}

async fn settle_and_attach_header(server: &ResourceServer, payload: &PayloadView, requirements: &RequirementsView, response: &mut Response<Body>) {
    let Ok(settle_response) = server.settle_payment(payload, requirements).await else {
        return;
    };
    if !settle_response.is_success() {
        return;
    }
    let Ok(encoded) = encode_settle_response(&settle_response) else {
        return;
    };
    if let Ok(value) = http::HeaderValue::from_str(&encoded) {
        response.headers_mut().insert(http::HeaderName::from_static(PAYMENT_RESPONSE_HEADER_LOWER), value);
        response
            .headers_mut()
            .insert(http::HeaderName::from_static("access-control-expose-headers"), http::HeaderValue::from_static(PAYMENT_RESPONSE_HEADER));
    }
}

const PAYMENT_RESPONSE_HEADER_LOWER: &str = "payment-response";

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::ServiceExt;
    use x402_core::chain::{ChainId, NetworkPattern};
    use x402_core::hooks::BoxFuture;
    use x402_core::proto::{SettleResponse, SupportedKind, SupportedResponse, VerifyResponse};
    use x402_core::scheme::{PriceInput, SchemeError, ServerScheme};
    use x402_core::server::FacilitatorClient;

    struct FlatRateScheme;

    impl ServerScheme for FlatRateScheme {
        fn scheme(&self) -> &str {
            "cash"
        }
        fn parse_price(&self, price: &PriceInput, _network: &ChainId) -> Result<x402_core::amount::AssetAmount, SchemeError> {
            match price {
                PriceInput::Money(money) => {
                    let atomic = x402_core::amount::parse_fiat_price(money, 2)?;
                    Ok(x402_core::amount::AssetAmount::new(atomic.to_string(), "USD"))
                }
                _ => Err("unsupported price input".into()),
            }
        }
    }

    struct AlwaysValidFacilitator;

    impl FacilitatorClient for AlwaysValidFacilitator {
        fn verify<'a>(&'a self, _version: u8, _payload: &'a PayloadView, _requirements: &'a RequirementsView) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
            Box::pin(async { Ok(VerifyResponse::Valid { payer: "Alice".into() }) })
        }
        fn settle<'a>(&'a self, _version: u8, _payload: &'a PayloadView, _requirements: &'a RequirementsView) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
            Box::pin(async { Ok(SettleResponse::Success { payer: "Alice".into(), transaction: "tx".into(), network: ChainId::new("x402", "cash") }) })
        }
        fn get_supported(&self) -> BoxFuture<'_, Result<SupportedResponse, SchemeError>> {
            let supported = SupportedResponse {
                kinds: vec![SupportedKind { x402_version: 2, scheme: "cash".into(), network: ChainId::new("x402", "cash"), extra: None }],
                ..Default::default()
            };
            Box::pin(async move { Ok(supported) })
        }
    }

    async fn gated_server() -> Arc<ResourceServer> {
        let mut server = ResourceServer::new();
        server.register_scheme(2, vec![NetworkPattern::exact("x402", "cash")], "cash", Arc::new(FlatRateScheme));
        server.add_facilitator(Arc::new(AlwaysValidFacilitator));
        server.initialize().await.unwrap();
        Arc::new(server)
    }

    type EchoFuture = Pin<Box<dyn Future<Output = Result<Response<Body>, Infallible>> + Send>>;

    fn echo_future(_req: Request<Body>) -> EchoFuture {
        Box::pin(async { Ok(Response::new(Body::from("ok"))) })
    }

    fn echo_service() -> tower::util::ServiceFn<fn(Request<Body>) -> EchoFuture> {
        tower::service_fn(echo_future as fn(Request<Body>) -> EchoFuture)
    }

    fn routes() -> RoutesConfig {
        let mut routes = HashMap::new();
        routes.insert(
            "GET /paid".to_string(),
            RouteConfig::single(crate::types::PaymentOption {
                scheme: "cash".into(),
                pay_to: "Alice".into(),
                price: serde_json::json!("$0.01"),
                network: "x402:cash".into(),
                max_timeout_seconds: None,
                extra: None,
            }),
        );
        routes
    }

    #[tokio::test]
    async fn test_unmatched_route_passes_through() {
        let server = gated_server().await;
        let layer = PaymentGateLayer::new(server, routes());
        let mut svc = layer.layer(echo_service());

        let req = Request::get("/free").body(Body::empty()).unwrap();
        let response = svc.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_matched_route_without_payment_returns_402() {
        let server = gated_server().await;
        let layer = PaymentGateLayer::new(server, routes());
        let mut svc = layer.layer(echo_service());

        let req = Request::get("/paid").body(Body::empty()).unwrap();
        let response = svc.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(response.headers().get(PAYMENT_REQUIRED_HEADER).is_some());
    }

    #[tokio::test]
    async fn test_matched_route_with_valid_payment_settles() {
        let server = gated_server().await;
        let requirements = v2::PaymentRequirements {
            scheme: "cash".into(),
            network: ChainId::new("x402", "cash"),
            amount: "1".into(),
            pay_to: "Alice".into(),
            asset: "USD".into(),
            max_timeout_seconds: 300,
            extra: None,
        };
        let payload = v2::PaymentPayload { x402_version: x402_core::proto::version::V2, resource: None, accepted: requirements, payload: serde_json::json!({}), extensions: None };
        let encoded = crate::headers::encode_payment_payload(&PayloadView::V2(Box::new(payload))).unwrap();

        let layer = PaymentGateLayer::new(server, routes());
        let mut svc = layer.layer(echo_service());

        let req = Request::get("/paid").header(PAYMENT_SIGNATURE_HEADER, encoded).body(Body::empty()).unwrap();
        let response = svc.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(PAYMENT_RESPONSE_HEADER_LOWER).is_some());
    }
}
