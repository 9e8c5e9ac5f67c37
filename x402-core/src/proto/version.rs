//! Const-generic protocol version marker.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::marker::PhantomData;

/// A protocol version marker that serializes as the bare integer `N` and
/// rejects deserializing any other value.
///
/// Keeping the version as a type parameter (rather than a plain `u8` field)
/// means `PaymentPayload<Version<1>, _>` and `PaymentPayload<Version<2>, _>`
/// cannot be confused by the type checker, matching the "parse once at the
/// boundary, never convert mid-flow" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version<const N: u8>(PhantomData<()>);

impl<const N: u8> Version<N> {
    /// The wrapped integer version.
    #[must_use]
    pub const fn value(self) -> u8 {
        N
    }
}

impl<const N: u8> Default for Version<N> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<const N: u8> Serialize for Version<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(N)
    }
}

impl<'de, const N: u8> Deserialize<'de> for Version<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        if value != N {
            return Err(de::Error::custom(format!(
                "expected x402Version {N}, found {value}"
            )));
        }
        Ok(Self(PhantomData))
    }
}

/// Protocol version 1 (legacy compatibility mode).
pub type X402Version1 = Version<1>;
/// Protocol version 2 (current).
pub type X402Version2 = Version<2>;

/// The version-1 marker value.
pub const V1: X402Version1 = Version(PhantomData);
/// The version-2 marker value.
pub const V2: X402Version2 = Version(PhantomData);

/// Raised by [`detect_version`] when `x402Version` is present but not 1 or 2.
#[derive(Debug, thiserror::Error)]
#[error("unsupported x402Version: {0}")]
pub struct UnsupportedVersionError(pub u8);

/// Reads the bare `x402Version` field out of an arbitrary JSON message
/// without committing to a full parse, so callers can route to the right
/// versioned type before deserializing the rest.
///
/// # Errors
///
/// Returns [`UnsupportedVersionError`] if the field is present but not `1`
/// or `2`, and a plain string error if it is missing or not a number.
pub fn detect_version(message: &serde_json::Value) -> Result<u8, DetectVersionError> {
    let raw = message
        .get("x402Version")
        .and_then(serde_json::Value::as_u64)
        .ok_or(DetectVersionError::Missing)?;
    let version = u8::try_from(raw).map_err(|_| DetectVersionError::Unsupported(UnsupportedVersionError(u8::MAX)))?;
    match version {
        1 | 2 => Ok(version),
        other => Err(DetectVersionError::Unsupported(UnsupportedVersionError(other))),
    }
}

/// Error from [`detect_version`].
#[derive(Debug, thiserror::Error)]
pub enum DetectVersionError {
    /// `x402Version` was missing or not a non-negative integer.
    #[error("missing or non-numeric x402Version field")]
    Missing,
    /// `x402Version` was present but not a recognized version.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedVersionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_serializes_as_bare_integer() {
        assert_eq!(serde_json::to_string(&V2).unwrap(), "2");
    }

    #[test]
    fn test_version_rejects_mismatch() {
        let result: Result<X402Version2, _> = serde_json::from_str("1");
        assert!(result.is_err());
    }

    #[test]
    fn test_detect_version() {
        let msg = serde_json::json!({"x402Version": 2});
        assert_eq!(detect_version(&msg).unwrap(), 2);
    }

    #[test]
    fn test_detect_version_unsupported() {
        let msg = serde_json::json!({"x402Version": 7});
        assert!(matches!(
            detect_version(&msg),
            Err(DetectVersionError::Unsupported(UnsupportedVersionError(7)))
        ));
    }

    #[test]
    fn test_detect_version_missing() {
        let msg = serde_json::json!({});
        assert!(matches!(detect_version(&msg), Err(DetectVersionError::Missing)));
    }
}
