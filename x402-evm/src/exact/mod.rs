//! The `exact` payment scheme for EVM chains: ERC-3009
//! `transferWithAuthorization`.
//!
//! - [`types`] — wire types for the signed authorization and its EIP-712
//!   domain, plus the `sol!`-generated contract ABI.
//! - `client`/`server`/`facilitator` (feature-gated) implement
//!   [`x402_core::scheme::ClientScheme`]/[`ServerScheme`]/[`FacilitatorScheme`].

pub mod types;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "facilitator")]
pub mod facilitator;
pub mod server;

/// The scheme identifier this module implements.
pub const SCHEME: &str = "exact";
