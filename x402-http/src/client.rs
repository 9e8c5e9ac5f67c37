//! HTTP client middleware for automatic x402 payment handling.
//!
//! Provides [`X402HttpClient`], a `reqwest-middleware` [`Middleware`] that
//! intercepts 402 responses, drives [`Client::create_payment_payload`], and
//! retries once with the signed payload attached.

use std::future::Future;
use std::sync::Arc;

use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use x402_core::client::Client;
use x402_core::hooks::PaymentRequiredView;

use crate::constants::HTTP_STATUS_PAYMENT_REQUIRED;
use crate::headers::{decode_payment_required, encode_payment_payload, extract_payment_required_header, payload_header_name};

#[cfg(feature = "telemetry")]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => { tracing::$level!($($arg)*) };
}
#[cfg(not(feature = "telemetry"))]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => {{}};
}

/// `reqwest-middleware` middleware that automatically handles HTTP 402
/// responses.
///
/// When a response with status 402 is received, the middleware:
/// 1. Decodes the `PAYMENT-REQUIRED` header.
/// 2. Delegates to [`Client::create_payment_payload`] to build a signed payload.
/// 3. Retries the original request with the signed payload attached.
///
/// Any failure along this path (missing header, no matching scheme, signing
/// error) falls back to returning the original 402 response unchanged.
#[derive(Debug, Clone)]
pub struct X402HttpClient {
    client: Arc<Client>,
}

impl X402HttpClient {
    /// Wraps an already-configured [`Client`].
    #[must_use]
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Wraps an owned [`Client`], allocating the `Arc` internally.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client: Arc::new(client) }
    }

    /// Builds a [`reqwest_middleware::ClientWithMiddleware`] with x402 payment
    /// handling from an owned [`Client`].
    #[must_use]
    pub fn build_reqwest(client: Client) -> reqwest_middleware::ClientWithMiddleware {
        reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).with(Self::from_client(client)).build()
    }

    fn extract_payment_required(response: &Response) -> Option<PaymentRequiredView> {
        let header_value = extract_payment_required_header(response.headers())?;
        decode_payment_required(header_value).ok()
    }
}

impl Middleware for X402HttpClient {
    fn handle<'life0, 'life1, 'life2, 'async_trait>(
        &'life0 self,
        req: Request,
        extensions: &'life1 mut http::Extensions,
        next: Next<'life2>,
    ) -> core::pin::Pin<Box<dyn Future<Output = Result<Response, reqwest_middleware::Error>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        'life2: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let method = req.method().clone();
            let url = req.url().clone();
            let original_headers = req.headers().clone();
            let body = req.body().and_then(reqwest::Body::try_clone);

            let response = next.clone().run(req, extensions).await?;

            if response.status().as_u16() != HTTP_STATUS_PAYMENT_REQUIRED {
                return Ok(response);
            }

            let Some(payment_required) = Self::extract_payment_required(&response) else {
                return Ok(response);
            };

            let payload = match self.client.create_payment_payload(&payment_required).await {
                Ok(payload) => payload,
                Err(error) => {
                    traced!(debug, %url, %error, "no payment payload could be created for 402 response");
                    return Ok(response);
                }
            };
            traced!(debug, %url, "retrying request with signed payment payload");

            let Ok(encoded) = encode_payment_payload(&payload) else { return Ok(response) };
            let version = match &payload {
                x402_core::hooks::PayloadView::V1(_) => 1,
                x402_core::hooks::PayloadView::V2(_) => 2,
            };

            let mut retry_req = Request::new(method, url);
            *retry_req.headers_mut() = original_headers;
            if let Some(body) = body {
                *retry_req.body_mut() = Some(body);
            }
            let Ok(header_name) = http::HeaderName::from_bytes(payload_header_name(version).as_bytes()) else { return Ok(response) };
            let Ok(header_value) = http::HeaderValue::from_str(&encoded) else { return Ok(response) };
            retry_req.headers_mut().insert(header_name, header_value);

            next.run(retry_req, extensions).await
        })
    }
}
