#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport layer for the x402 payment protocol.
//!
//! This crate carries no payment logic of its own — it only moves
//! [`x402_core`] types across the wire: encoding/decoding the
//! `PAYMENT-REQUIRED`/`PAYMENT-SIGNATURE`/`PAYMENT-RESPONSE` (and legacy
//! `X-PAYMENT`/`X-PAYMENT-RESPONSE`) headers, a `reqwest-middleware`
//! [`Middleware`](reqwest_middleware::Middleware) that retries 402 responses
//! with a signed payload, and a `tower` [`Layer`](tower::Layer) that gates
//! an inner service behind [`x402_core::server::ResourceServer`].
//!
//! # Feature Flags
//!
//! - `client` — `reqwest-middleware` based automatic 402 handling.
//! - `server` — `axum`/`tower` middleware for payment gating.
//! - `telemetry` — tracing instrumentation.

pub mod constants;
pub mod error;
pub mod headers;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "client")]
pub mod facilitator;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "server")]
pub mod types;
