#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! The two built-in x402 protocol extensions: `payment-identifier`
//! (client-supplied idempotency keys) and `bazaar` (resource discovery).
//!
//! Both extensions are pure data plus an [`x402_core::extensions::Extension`]
//! registration; the idempotency cache and resource catalog they enable are
//! ordinary structs that application glue (an HTTP paygate, a facilitator
//! binary) wires around [`x402_core::client::Client`] /
//! [`x402_core::server::ResourceServer`] / [`x402_core::facilitator::Facilitator`]
//! calls, the same way the reference implementation leaves idempotency
//! storage and catalog persistence to the integrator.

pub mod bazaar;
pub mod payment_identifier;
