#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-155 (EVM) chain support for the x402 payment protocol.
//!
//! Implements the `exact` payment scheme (ERC-3009 `transferWithAuthorization`)
//! against any EVM-compatible chain, plugging into `x402_core::scheme`'s
//! `ClientScheme`/`ServerScheme`/`FacilitatorScheme` traits.
//!
//! # Modules
//!
//! - [`chain`] — EVM provider wrapper and the v1 network alias table
//! - [`exact`] — the `exact` scheme's client/server/facilitator halves
//!
//! # Feature flags
//!
//! - `client` — signer-side EIP-712 signing (`alloy-signer`/`alloy-signer-local`)
//! - `facilitator` — on-chain verification/settlement (`alloy-provider`)
//! - `telemetry` — `tracing` instrumentation

pub mod chain;
pub mod exact;

mod networks;
pub use networks::*;
