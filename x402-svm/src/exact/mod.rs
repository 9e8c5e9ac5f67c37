pub mod types;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "facilitator")]
pub mod facilitator;
pub mod server;

pub const SCHEME: &str = "exact";
