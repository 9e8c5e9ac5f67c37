//! Error hierarchy shared by `Client`, `ResourceServer`, and `Facilitator`.

use crate::chain::NetworkPattern;

/// Raised when [`crate::registry::MechanismRegistry`] has no entry for a
/// requested `(version, network, scheme)` triple.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no mechanism registered for version {version}, scheme {scheme:?}, network {network}")]
pub struct SchemeNotFoundError {
    /// Protocol version requested.
    pub version: u8,
    /// Network requested.
    pub network: String,
    /// Scheme requested, if a specific one was named.
    pub scheme: Option<String>,
}

impl SchemeNotFoundError {
    /// Builds a `SchemeNotFoundError` for the given lookup key.
    pub fn new(version: u8, network: impl Into<String>, scheme: Option<String>) -> Self {
        Self {
            version,
            network: network.into(),
            scheme,
        }
    }
}

/// Raised when [`crate::client::Client`]'s policy pipeline filters every
/// candidate requirement out.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no matching payment requirements: {reason}")]
pub struct NoMatchingRequirementsError {
    /// Why no candidates survived.
    pub reason: String,
}

impl NoMatchingRequirementsError {
    /// Builds a `NoMatchingRequirementsError` with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Raised when a before-hook aborts an operation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("operation aborted: {reason}")]
pub struct PaymentAbortedError {
    /// The reason the hook supplied.
    pub reason: String,
}

impl PaymentAbortedError {
    /// Builds a `PaymentAbortedError` with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Raised when no configured hook recovers a lookup miss registered against
/// an entire network pattern (e.g. the facilitator client has nothing
/// registered for `eip155:*`).
#[derive(Debug, Clone, thiserror::Error)]
#[error("unsupported network pattern: {0}")]
pub struct UnsupportedNetworkError(pub NetworkPattern);

/// Raised when an operation requiring `ResourceServer::initialize()` is
/// called before initialization completes.
#[derive(Debug, Clone, thiserror::Error)]
#[error("ResourceServer::initialize() must be called before use")]
pub struct NotInitializedError;

/// Top-level client-facing error, so HTTP wrapper libraries can decide
/// whether to retry, bubble up, or surface to the end user.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// No mechanism found for a requested scheme/network/version.
    #[error(transparent)]
    SchemeNotFound(#[from] SchemeNotFoundError),
    /// All candidate requirements were filtered out.
    #[error(transparent)]
    NoMatchingRequirements(#[from] NoMatchingRequirementsError),
    /// A before-hook aborted the operation.
    #[error(transparent)]
    Aborted(#[from] PaymentAbortedError),
    /// `ResourceServer::initialize()` was not called first.
    #[error(transparent)]
    NotInitialized(#[from] NotInitializedError),
    /// The mechanism's `createPaymentPayload` failed and no hook recovered it.
    #[error("failed to create payment payload: {0}")]
    MechanismFailure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_not_found_display() {
        let error = SchemeNotFoundError::new(2, "eip155:8453", Some("exact".to_string()));
        assert!(error.to_string().contains("eip155:8453"));
    }

    #[test]
    fn test_payment_error_from_aborted() {
        let aborted = PaymentAbortedError::new("user_denied");
        let error: PaymentError = aborted.into();
        assert!(matches!(error, PaymentError::Aborted(_)));
    }
}
