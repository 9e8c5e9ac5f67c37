#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! x402 facilitator HTTP service.
//!
//! Verifies and settles payments on behalf of resource servers, decoupling
//! them from blockchain RPC details. Wires [`x402_core::facilitator::Facilitator`]
//! up to an `axum` HTTP surface; chain support ([`x402_evm`], [`x402_svm`])
//! and discovery ([`x402_extensions::bazaar`]) are plugged in by the binary
//! at startup based on [`config::FacilitatorConfig`].
//!
//! # Modules
//!
//! - [`config`] — TOML configuration with `$VAR`/`${VAR}` environment expansion
//! - [`error`] — HTTP-facing error type for route handlers
//! - [`handlers`] — `/verify`, `/settle`, `/supported`, `/discovery/resources` routes
//! - [`shutdown`] — graceful shutdown on SIGTERM/SIGINT

pub mod config;
pub mod error;
pub mod handlers;
pub mod shutdown;
