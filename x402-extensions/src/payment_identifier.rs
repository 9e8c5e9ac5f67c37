//! The `payment-identifier` extension: a client-supplied idempotency key
//! that lets a resource server recognize a retried `PaymentPayload` and
//! return the cached verify/settle result instead of re-running the
//! mechanism.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use x402_core::extensions::Extension;
use x402_core::hooks::BoxFuture;
use x402_core::proto::Extensions;

/// This extension's key in `PaymentRequired.extensions` / `PaymentPayload.extensions`.
pub const PAYMENT_IDENTIFIER: &str = "payment-identifier";

/// Minimum accepted length of a payment identifier.
pub const PAYMENT_ID_MIN_LENGTH: usize = 16;
/// Maximum accepted length of a payment identifier.
pub const PAYMENT_ID_MAX_LENGTH: usize = 128;

fn payment_id_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[A-Za-z0-9_-]+$").expect("static pattern is valid"))
}

/// Errors raised while appending or validating a payment identifier.
#[derive(Debug, thiserror::Error)]
pub enum PaymentIdentifierError {
    /// The supplied or generated id failed format validation.
    #[error(
        "invalid payment id {id:?}: must be {PAYMENT_ID_MIN_LENGTH}-{PAYMENT_ID_MAX_LENGTH} characters, alphanumeric with '-'/'_'"
    )]
    InvalidId {
        /// The offending id.
        id: String,
    },
    /// The server declared `required: true` but the payload carries no id.
    #[error("payment-identifier extension is required but missing from the payload")]
    Missing,
}

/// The `payment-identifier` declaration/payload info: `required` on the
/// server's declaration, `id` on the client's echoed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIdentifierInfo {
    /// Whether the resource server requires an id.
    pub required: bool,
    /// The client-supplied idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// `Extension` registration for `payment-identifier`.
///
/// The declaration is static (`{required}` plus the JSON Schema below), so
/// `enrich_declaration` is the default passthrough.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentIdentifierExtension;

impl Extension for PaymentIdentifierExtension {
    fn key(&self) -> &str {
        PAYMENT_IDENTIFIER
    }
}

/// Builds the `PaymentRequired.extensions["payment-identifier"]` declaration.
#[must_use]
pub fn declare_payment_identifier_extension(required: bool) -> Value {
    serde_json::json!({
        "info": { "required": required },
        "schema": payment_identifier_schema(),
    })
}

/// The JSON Schema (draft 2020-12) describing `PaymentIdentifierInfo`.
#[must_use]
pub fn payment_identifier_schema() -> Value {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "properties": {
            "required": { "type": "boolean" },
            "id": {
                "type": "string",
                "minLength": PAYMENT_ID_MIN_LENGTH,
                "maxLength": PAYMENT_ID_MAX_LENGTH,
                "pattern": "^[A-Za-z0-9_-]+$",
            },
        },
        "required": ["required"],
    })
}

/// Generates a unique payment identifier: `prefix` followed by 32 lowercase
/// hex characters (16 random bytes).
#[must_use]
pub fn generate_payment_id(prefix: &str) -> String {
    let bytes: [u8; 16] = rand::rng().random();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{prefix}{hex}")
}

/// Whether `id` meets the payment-identifier format requirements.
#[must_use]
pub fn is_valid_payment_id(id: &str) -> bool {
    (PAYMENT_ID_MIN_LENGTH..=PAYMENT_ID_MAX_LENGTH).contains(&id.len()) && payment_id_pattern().is_match(id)
}

fn declared_info(extensions: &Extensions) -> Option<PaymentIdentifierInfo> {
    let declaration = extensions.get(PAYMENT_IDENTIFIER)?;
    let info = declaration.get("info")?;
    serde_json::from_value(info.clone()).ok()
}

/// Appends a payment identifier to `extensions`, but only if the server
/// declared support for the `payment-identifier` extension (i.e.
/// `extensions["payment-identifier"]` is present with a valid `info`
/// section). A no-op otherwise.
///
/// # Errors
///
/// Returns [`PaymentIdentifierError::InvalidId`] if `id` is supplied and
/// fails format validation.
pub fn append_payment_identifier_to_extensions(extensions: &mut Extensions, id: Option<String>) -> Result<(), PaymentIdentifierError> {
    let Some(mut info) = declared_info(extensions) else {
        return Ok(());
    };

    let payment_id = id.unwrap_or_else(|| generate_payment_id("pay_"));
    if !is_valid_payment_id(&payment_id) {
        return Err(PaymentIdentifierError::InvalidId { id: payment_id });
    }

    info.id = Some(payment_id);
    let mut declaration = extensions.get(PAYMENT_IDENTIFIER).cloned().unwrap_or_else(|| serde_json::json!({}));
    declaration["info"] = serde_json::to_value(info).expect("PaymentIdentifierInfo always serializes");
    extensions.insert(PAYMENT_IDENTIFIER.to_string(), declaration);
    Ok(())
}

/// Extracts the client-supplied id from a `PaymentPayload.extensions` map,
/// if present and well-formed.
#[must_use]
pub fn extract_payment_identifier(extensions: Option<&Extensions>) -> Option<String> {
    let info = declared_info(extensions?)?;
    info.id.filter(|id| is_valid_payment_id(id))
}

/// Whether the server's declaration marks the `payment-identifier`
/// extension as required.
#[must_use]
pub fn is_payment_identifier_required(extensions: Option<&Extensions>) -> bool {
    extensions.and_then(declared_info).is_some_and(|info| info.required)
}

/// Validates a payload's extensions against a server's required/optional
/// declaration. Returns `Err` if the server requires an id and none (or an
/// invalid one) is present.
///
/// # Errors
///
/// Returns [`PaymentIdentifierError::Missing`] if `required: true` was
/// declared and the payload carries no valid id.
pub fn validate_payment_identifier_requirement(
    declared: Option<&Extensions>,
    payload: Option<&Extensions>,
) -> Result<Option<String>, PaymentIdentifierError> {
    let id = extract_payment_identifier(payload);
    if is_payment_identifier_required(declared) && id.is_none() {
        return Err(PaymentIdentifierError::Missing);
    }
    Ok(id)
}

/// An idempotency store keyed by payment-identifier id.
///
/// Object-safe so integrators can swap the reference [`InMemoryIdempotencyCache`]
/// for a distributed backend (Redis, ...) without touching call sites.
pub trait IdempotencyCache: Send + Sync {
    /// Looks up a cached result, ignoring (and implicitly evicting) expired
    /// entries.
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Option<Value>>;

    /// Stores `value` under `id` for `ttl`.
    fn put<'a>(&'a self, id: &'a str, value: Value, ttl: Duration) -> BoxFuture<'a, ()>;
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Reference [`IdempotencyCache`]: a `HashMap` behind a [`parking_lot::Mutex`],
/// with a default TTL of one hour (spec.md's reference value) and per-key
/// single-flight deduplication for cache-miss computation.
pub struct InMemoryIdempotencyCache {
    entries: parking_lot::Mutex<HashMap<String, CacheEntry>>,
    locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    default_ttl: Duration,
}

impl std::fmt::Debug for InMemoryIdempotencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIdempotencyCache").field("default_ttl", &self.default_ttl).finish_non_exhaustive()
    }
}

impl Default for InMemoryIdempotencyCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl InMemoryIdempotencyCache {
    /// Builds a cache with the given default TTL.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self { entries: parking_lot::Mutex::new(HashMap::new()), locks: parking_lot::Mutex::new(HashMap::new()), default_ttl }
    }

    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().entry(id.to_string()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
    }

    fn cached(&self, id: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(id) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    /// Returns the cached result for `id` if present and unexpired;
    /// otherwise runs `compute` (holding a per-id lock so concurrent calls
    /// for the same id serialize and only one actually computes) and caches
    /// its result under this cache's default TTL.
    pub async fn get_or_insert_with<F, Fut>(&self, id: &str, compute: F) -> Value
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Value>,
    {
        if let Some(cached) = self.cached(id) {
            return cached;
        }

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        // Another caller may have populated the cache while we waited for the lock.
        if let Some(cached) = self.cached(id) {
            return cached;
        }

        let value = compute().await;
        self.entries.lock().insert(id.to_string(), CacheEntry { value: value.clone(), expires_at: Instant::now() + self.default_ttl });
        value
    }
}

impl IdempotencyCache for InMemoryIdempotencyCache {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Option<Value>> {
        Box::pin(async move { self.cached(id) })
    }

    fn put<'a>(&'a self, id: &'a str, value: Value, ttl: Duration) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.entries.lock().insert(id.to_string(), CacheEntry { value, expires_at: Instant::now() + ttl });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_payment_id_is_valid() {
        let id = generate_payment_id("pay_");
        assert!(is_valid_payment_id(&id));
        assert!(id.starts_with("pay_"));
    }

    #[test]
    fn test_is_valid_payment_id_rejects_short_and_bad_chars() {
        assert!(!is_valid_payment_id("short"));
        assert!(!is_valid_payment_id(&"a".repeat(129)));
        assert!(!is_valid_payment_id("not valid! chars$$$$$$$$$$"));
    }

    #[test]
    fn test_append_is_noop_when_not_declared() {
        let mut extensions = Extensions::new();
        append_payment_identifier_to_extensions(&mut extensions, None).unwrap();
        assert!(extensions.is_empty());
    }

    #[test]
    fn test_append_and_extract_roundtrip() {
        let mut extensions = Extensions::new();
        extensions.insert(PAYMENT_IDENTIFIER.to_string(), declare_payment_identifier_extension(true));

        append_payment_identifier_to_extensions(&mut extensions, Some("a-custom-payment-id-1234".to_string())).unwrap();

        assert_eq!(extract_payment_identifier(Some(&extensions)).as_deref(), Some("a-custom-payment-id-1234"));
        assert!(is_payment_identifier_required(Some(&extensions)));
    }

    #[test]
    fn test_append_rejects_invalid_custom_id() {
        let mut extensions = Extensions::new();
        extensions.insert(PAYMENT_IDENTIFIER.to_string(), declare_payment_identifier_extension(false));
        assert!(append_payment_identifier_to_extensions(&mut extensions, Some("short".to_string())).is_err());
    }

    #[test]
    fn test_validate_requirement_missing_when_required() {
        let mut declared = Extensions::new();
        declared.insert(PAYMENT_IDENTIFIER.to_string(), declare_payment_identifier_extension(true));
        assert!(validate_payment_identifier_requirement(Some(&declared), None).is_err());
    }

    #[tokio::test]
    async fn test_in_memory_cache_hits_without_recomputing() {
        let cache = InMemoryIdempotencyCache::default();
        let calls = std::sync::atomic::AtomicUsize::new(0);

        let compute = || async {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            serde_json::json!({"settled": true})
        };
        let first = cache.get_or_insert_with("id-1", compute).await;
        let second = cache.get_or_insert_with("id-1", compute).await;

        assert_eq!(first, second);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_idempotency_cache_trait_put_then_get() {
        let cache = InMemoryIdempotencyCache::default();
        cache.put("id-2", serde_json::json!({"ok": true}), Duration::from_secs(60)).await;
        assert_eq!(cache.get("id-2").await, Some(serde_json::json!({"ok": true})));
    }
}
