//! HTTP-based facilitator client: implements
//! [`x402_core::server::FacilitatorClient`] by calling a remote facilitator
//! service's `/verify`, `/settle`, and `/supported` endpoints.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use x402_core::hooks::{BoxFuture, PayloadView, RequirementsView};
use x402_core::proto::{SettleResponse, SupportedResponse, VerifyResponse};
use x402_core::scheme::SchemeError;
use x402_core::server::FacilitatorClient;

#[cfg(feature = "telemetry")]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => { tracing::$level!($($arg)*) };
}
#[cfg(not(feature = "telemetry"))]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => {{}};
}

/// Per-endpoint authentication headers applied to outgoing facilitator
/// requests.
#[derive(Debug, Clone, Default)]
pub struct AuthHeaders {
    /// Headers to include in verify requests.
    pub verify: HeaderMap,
    /// Headers to include in settle requests.
    pub settle: HeaderMap,
    /// Headers to include in get-supported requests.
    pub supported: HeaderMap,
}

/// Generates authentication headers for facilitator requests. Implement this
/// for API-key or OAuth-authenticated facilitator endpoints.
pub trait AuthProvider: Send + Sync {
    /// Returns authentication headers for each facilitator endpoint.
    fn get_auth_headers(&self) -> AuthHeaders;
}

/// [`AuthProvider`] that sends the same static headers to every endpoint.
#[derive(Debug, Clone)]
pub struct StaticAuthProvider {
    headers: HeaderMap,
}

impl StaticAuthProvider {
    /// Creates a provider from a pre-built header map.
    #[must_use]
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Creates a provider from a single bearer token.
    ///
    /// # Panics
    ///
    /// Panics if `token` contains invalid header characters.
    #[must_use]
    pub fn bearer(token: &str) -> Self {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {token}")).expect("valid bearer token");
        headers.insert(reqwest::header::AUTHORIZATION, value);
        Self { headers }
    }
}

impl AuthProvider for StaticAuthProvider {
    fn get_auth_headers(&self) -> AuthHeaders {
        AuthHeaders { verify: self.headers.clone(), settle: self.headers.clone(), supported: self.headers.clone() }
    }
}

/// Configuration for [`HttpFacilitatorClient`].
pub struct FacilitatorConfig {
    /// Facilitator service base URL (no trailing slash).
    pub url: String,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Optional authentication provider.
    pub auth_provider: Option<Box<dyn AuthProvider>>,
    /// Optional pre-configured `reqwest::Client`; a new one is built with
    /// `timeout` if omitted.
    pub http_client: Option<reqwest::Client>,
}

impl FacilitatorConfig {
    /// Creates a config pointed at `url` with a 30-second default timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), timeout: Duration::from_secs(30), auth_provider: None, http_client: None }
    }

    /// Overrides the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the authentication provider.
    #[must_use]
    pub fn with_auth(mut self, provider: impl AuthProvider + 'static) -> Self {
        self.auth_provider = Some(Box::new(provider));
        self
    }
}

impl std::fmt::Debug for FacilitatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorConfig")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("has_auth_provider", &self.auth_provider.is_some())
            .finish()
    }
}

/// Wire format for verify/settle request bodies sent to the facilitator.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FacilitatorRequestBody {
    x402_version: u8,
    payment_payload: serde_json::Value,
    payment_requirements: serde_json::Value,
}

/// HTTP-backed [`FacilitatorClient`] that delegates verify/settle/supported
/// calls to a remote facilitator service (e.g. `x402.org`'s hosted
/// facilitator, or an in-house `x402-facilitator` deployment).
pub struct HttpFacilitatorClient {
    url: String,
    auth_provider: Option<Box<dyn AuthProvider>>,
    client: reqwest::Client,
}

impl HttpFacilitatorClient {
    /// Builds a client from `config`.
    ///
    /// # Panics
    ///
    /// Panics if the internal `reqwest::Client` fails to build (TLS backend
    /// initialization failure).
    #[must_use]
    pub fn new(config: FacilitatorConfig) -> Self {
        let url = config.url.trim_end_matches('/').to_owned();
        let client = config
            .http_client
            .unwrap_or_else(|| reqwest::Client::builder().timeout(config.timeout).build().expect("failed to build reqwest::Client"));
        Self { url, auth_provider: config.auth_provider, client }
    }

    /// The facilitator base URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn headers_for(&self, pick: impl Fn(&AuthHeaders) -> &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(auth) = &self.auth_provider {
            headers.extend(pick(&auth.get_auth_headers()).clone());
        }
        headers
    }

    fn view_to_value(requirements: &RequirementsView) -> serde_json::Value {
        match requirements {
            RequirementsView::V1(r) => serde_json::to_value(r),
            RequirementsView::V2(r) => serde_json::to_value(r),
        }
        .unwrap_or(serde_json::Value::Null)
    }

    fn payload_to_value(payload: &PayloadView) -> serde_json::Value {
        match payload {
            PayloadView::V1(p) => serde_json::to_value(p),
            PayloadView::V2(p) => serde_json::to_value(p.as_ref()),
        }
        .unwrap_or(serde_json::Value::Null)
    }
}

impl std::fmt::Debug for HttpFacilitatorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFacilitatorClient").field("url", &self.url).field("has_auth_provider", &self.auth_provider.is_some()).finish_non_exhaustive()
    }
}

impl FacilitatorClient for HttpFacilitatorClient {
    fn verify<'a>(&'a self, version: u8, payload: &'a PayloadView, requirements: &'a RequirementsView) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
        Box::pin(async move {
            let body = FacilitatorRequestBody {
                x402_version: version,
                payment_payload: Self::payload_to_value(payload),
                payment_requirements: Self::view_to_value(requirements),
            };

            let response = self
                .client
                .post(format!("{}/verify", self.url))
                .headers(self.headers_for(|h| &h.verify))
                .json(&body)
                .send()
                .await
                .map_err(|e| -> SchemeError { format!("facilitator verify request failed: {e}").into() })?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                traced!(warn, %status, body = %text, "facilitator verify request rejected");
                return Err(format!("facilitator verify failed ({status}): {text}").into());
            }

            let result: VerifyResponse = response.json().await.map_err(|e| -> SchemeError { format!("facilitator verify response parse error: {e}").into() })?;
            Ok(result)
        })
    }

    fn settle<'a>(&'a self, version: u8, payload: &'a PayloadView, requirements: &'a RequirementsView) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
        Box::pin(async move {
            let body = FacilitatorRequestBody {
                x402_version: version,
                payment_payload: Self::payload_to_value(payload),
                payment_requirements: Self::view_to_value(requirements),
            };

            let response = self
                .client
                .post(format!("{}/settle", self.url))
                .headers(self.headers_for(|h| &h.settle))
                .json(&body)
                .send()
                .await
                .map_err(|e| -> SchemeError { format!("facilitator settle request failed: {e}").into() })?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                traced!(warn, %status, body = %text, "facilitator settle request rejected");
                return Err(format!("facilitator settle failed ({status}): {text}").into());
            }

            let result: SettleResponse = response.json().await.map_err(|e| -> SchemeError { format!("facilitator settle response parse error: {e}").into() })?;
            Ok(result)
        })
    }

    fn get_supported(&self) -> BoxFuture<'_, Result<SupportedResponse, SchemeError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(format!("{}/supported", self.url))
                .headers(self.headers_for(|h| &h.supported))
                .send()
                .await
                .map_err(|e| -> SchemeError { format!("facilitator get_supported request failed: {e}").into() })?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(format!("facilitator get_supported failed ({status}): {text}").into());
            }

            let result: SupportedResponse =
                response.json().await.map_err(|e| -> SchemeError { format!("facilitator get_supported response parse error: {e}").into() })?;
            Ok(result)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use x402_core::chain::ChainId;
    use x402_core::proto::v2;

    fn sample_requirements() -> RequirementsView {
        RequirementsView::V2(v2::PaymentRequirements {
            scheme: "exact".into(),
            network: "eip155:8453".parse::<ChainId>().unwrap(),
            amount: "1000".into(),
            pay_to: "0xabc".into(),
            asset: "0xusdc".into(),
            max_timeout_seconds: 60,
            extra: None,
        })
    }

    #[tokio::test]
    async fn test_verify_posts_to_verify_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"isValid": true, "payer": "0xabc"})))
            .mount(&server)
            .await;

        let client = HttpFacilitatorClient::new(FacilitatorConfig::new(server.uri()));
        let requirements = sample_requirements();
        let payload = PayloadView::V2(Box::new(v2::PaymentPayload {
            x402_version: x402_core::proto::version::V2,
            resource: None,
            accepted: match &requirements {
                RequirementsView::V2(r) => r.clone(),
                RequirementsView::V1(_) => unreachable!(),
            },
            payload: serde_json::json!({}),
            extensions: None,
        }));

        let result = client.verify(2, &payload, &requirements).await.unwrap();
        assert!(result.is_valid());
    }

    #[tokio::test]
    async fn test_verify_propagates_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/verify")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let client = HttpFacilitatorClient::new(FacilitatorConfig::new(server.uri()));
        let requirements = sample_requirements();
        let payload = PayloadView::V2(Box::new(v2::PaymentPayload {
            x402_version: x402_core::proto::version::V2,
            resource: None,
            accepted: match &requirements {
                RequirementsView::V2(r) => r.clone(),
                RequirementsView::V1(_) => unreachable!(),
            },
            payload: serde_json::json!({}),
            extensions: None,
        }));

        assert!(client.verify(2, &payload, &requirements).await.is_err());
    }
}
