//! Route configuration for the payment-gating `tower` middleware.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A payment option accepted by a protected route: a `(scheme, network)`
/// pair plus price and recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOption {
    /// Payment scheme identifier (e.g. `"exact"`).
    pub scheme: String,

    /// Recipient address.
    pub pay_to: String,

    /// Price — a money string (e.g. `"$0.01"`) or structured amount.
    pub price: Value,

    /// CAIP-2 network identifier, or a pattern like `"eip155:*"`.
    pub network: String,

    /// Maximum payment validity in seconds (defaults to 300 if unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,

    /// Scheme-specific extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Configuration for a payment-protected route.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// Accepted payment options for this route.
    pub accepts: Vec<PaymentOption>,

    /// Override resource URL (defaults to the request path).
    pub resource: Option<String>,

    /// Human-readable description of the resource.
    pub description: Option<String>,

    /// MIME type of the resource.
    pub mime_type: Option<String>,

    /// Declared extension data for this route (e.g.
    /// `payment-identifier`'s `{required}`, `bazaar`'s discovery info),
    /// attached to the 402 response's `extensions` map.
    pub extensions: Option<HashMap<String, Value>>,
}

impl RouteConfig {
    /// A route config with a single payment option.
    #[must_use]
    pub fn single(option: PaymentOption) -> Self {
        Self { accepts: vec![option], resource: None, description: None, mime_type: None, extensions: None }
    }

    /// A route config with multiple payment options.
    #[must_use]
    pub fn multi(options: Vec<PaymentOption>) -> Self {
        Self { accepts: options, resource: None, description: None, mime_type: None, extensions: None }
    }

    /// Overrides the resource URL reported in the `PaymentRequired` response.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Sets the resource description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the resource MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Declares extension data to attach to this route's 402 responses.
    #[must_use]
    pub fn with_extensions(mut self, extensions: HashMap<String, Value>) -> Self {
        self.extensions = Some(extensions);
        self
    }
}

/// A compiled route entry mapping a method + path pattern to its config.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRoute {
    pub method: String,
    pub path_pattern: String,
    pub config: RouteConfig,
}

impl CompiledRoute {
    pub fn matches(&self, method: &str, path: &str) -> bool {
        if self.method != "*" && !self.method.eq_ignore_ascii_case(method) {
            return false;
        }
        match_path_pattern(&self.path_pattern, path)
    }
}

/// Glob-style path matching: exact, trailing-wildcard (`/api/*`), or `*`.
fn match_path_pattern(pattern: &str, path: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let normalized_path = path.split('?').next().unwrap_or(path);
    let normalized_path = normalized_path.trim_end_matches('/');
    let normalized_pattern = pattern.trim_end_matches('/');

    if let Some(prefix) = normalized_pattern.strip_suffix("/*") {
        normalized_path == prefix || normalized_path.starts_with(&format!("{prefix}/"))
    } else {
        normalized_path.eq_ignore_ascii_case(normalized_pattern)
    }
}

/// Parses `"GET /weather"` → `("GET", "/weather")`, or a bare path → `("*", path)`.
pub(crate) fn parse_route_pattern(pattern: &str) -> (String, String) {
    let trimmed = pattern.trim();
    if let Some((method, path)) = trimmed.split_once(char::is_whitespace) {
        (method.to_uppercase(), path.trim().to_owned())
    } else {
        ("*".to_owned(), trimmed.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route_pattern_with_method() {
        assert_eq!(parse_route_pattern("GET /weather"), ("GET".to_string(), "/weather".to_string()));
    }

    #[test]
    fn test_parse_route_pattern_without_method() {
        assert_eq!(parse_route_pattern("/weather"), ("*".to_string(), "/weather".to_string()));
    }

    #[test]
    fn test_match_path_pattern_trailing_wildcard() {
        let route = CompiledRoute { method: "*".into(), path_pattern: "/api/*".into(), config: RouteConfig::multi(vec![]) };
        assert!(route.matches("GET", "/api/foo"));
        assert!(route.matches("GET", "/api/foo/bar"));
        assert!(!route.matches("GET", "/other"));
    }

    #[test]
    fn test_match_path_pattern_method_mismatch() {
        let route = CompiledRoute { method: "POST".into(), path_pattern: "/weather".into(), config: RouteConfig::multi(vec![]) };
        assert!(!route.matches("GET", "/weather"));
        assert!(route.matches("POST", "/weather"));
    }
}
