#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Solana chain support for the x402 payment protocol.
//!
//! Implements the `exact` scheme as SPL Token `TransferChecked`
//! instructions, pre-signed by the payer and co-signed (fee-paid) by the
//! facilitator at settlement time.
//!
//! # Feature Flags
//!
//! - `client` - client-side transaction building and signing
//! - `facilitator` - facilitator-side verification and settlement
//! - `telemetry` - `tracing` instrumentation

pub mod exact;

#[cfg(any(feature = "client", feature = "facilitator"))]
pub mod chain;

mod networks;
pub use networks::*;
