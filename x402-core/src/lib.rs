#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types and orchestration for the x402 payment protocol.
//!
//! This crate is blockchain-agnostic: it defines the wire types, the
//! `(version, network, scheme)` mechanism registry, and the three cooperating
//! components of a payment flow — [`client::Client`], [`server::ResourceServer`],
//! and [`facilitator::Facilitator`] — without committing to any particular
//! chain. Chain-specific signing/verification/settlement is provided by
//! separate mechanism crates (e.g. `x402-evm`, `x402-svm`) that implement the
//! [`scheme::ClientScheme`]/[`scheme::ServerScheme`]/[`scheme::FacilitatorScheme`]
//! traits.
//!
//! # Overview
//!
//! The x402 protocol lets an HTTP client pay for a resource by retrying a 402
//! response with a signed payment authorization. [`server::ResourceServer`]
//! prices resources and builds the 402 body; [`client::Client`] selects an
//! offered requirement and signs against it; [`facilitator::Facilitator`]
//! verifies and settles the resulting payload, decoupling the resource server
//! from blockchain RPC details.
//!
//! # Modules
//!
//! - [`amount`] — fiat/atomic amount parsing
//! - [`chain`] — CAIP-2 chain identifiers, network patterns, network registry
//! - [`encoding`] — base64(+JSON) helpers for wire payloads
//! - [`error`] — error hierarchy shared across components
//! - [`hooks`] — lifecycle hook machinery (before/after/failure)
//! - [`proto`] — wire types for both protocol versions
//! - [`scheme`] — the three mechanism-role traits
//! - [`registry`] — the `(version, network, scheme)` → mechanism table
//! - [`client`] — the `Client` component
//! - [`server`] — the `ResourceServer` component
//! - [`facilitator`] — the `Facilitator` component
//! - [`config`] — per-route pricing configuration
//! - [`extensions`] — named protocol extensions (payment-identifier, bazaar)
//! - [`mcp`] — data-shape conventions for x402-over-MCP
//!
//! # Feature flags
//!
//! - `telemetry` — enables `tracing` instrumentation in the hook-failure paths.

pub mod amount;
pub mod chain;
pub mod client;
pub mod config;
pub mod encoding;
pub mod error;
pub mod extensions;
pub mod facilitator;
pub mod hooks;
pub mod mcp;
pub mod proto;
pub mod registry;
pub mod scheme;
pub mod server;
