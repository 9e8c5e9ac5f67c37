//! Named extensions that hook into `PaymentRequired` declarations and
//! payload enrichment (`payment-identifier`, `bazaar`).

use serde_json::Value;

/// A named protocol extension.
///
/// Extensions are pure data plus an optional `enrich_declaration` hook that
/// lets transport adapters (HTTP, MCP) inject transport-specific fields into
/// the extension's declaration before it is sent.
pub trait Extension: Send + Sync {
    /// The extension's key in `PaymentRequired.extensions` / `PaymentPayload.extensions`.
    fn key(&self) -> &str;

    /// Enriches `declaration` with transport-specific fields. Default is a
    /// passthrough.
    fn enrich_declaration(&self, declaration: Value, _transport_context: &Value) -> Value {
        declaration
    }
}

/// Registry of extensions, applied in registration order.
///
/// Registration order is used rather than any implicit priority because the
/// order in which multiple extensions would touch the same `PaymentRequired`
/// field is otherwise undefined; making it deterministic here means the same
/// server configuration always produces the same wire output.
#[derive(Default)]
pub struct ExtensionSystem {
    extensions: Vec<Box<dyn Extension>>,
}

impl ExtensionSystem {
    /// An empty extension system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extension. Re-registering the same key replaces the
    /// prior registration in place, preserving its original position.
    pub fn register(&mut self, extension: Box<dyn Extension>) {
        let key = extension.key().to_string();
        if let Some(slot) = self.extensions.iter_mut().find(|e| e.key() == key) {
            *slot = extension;
        } else {
            self.extensions.push(extension);
        }
    }

    /// The names of every registered extension.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.key()).collect()
    }

    /// Applies every registered extension whose key is present in
    /// `declarations` to its own declaration value, in registration order.
    #[must_use]
    pub fn enrich_all(&self, mut declarations: serde_json::Map<String, Value>, transport_context: &Value) -> serde_json::Map<String, Value> {
        for extension in &self.extensions {
            if let Some(declaration) = declarations.remove(extension.key()) {
                let enriched = extension.enrich_declaration(declaration, transport_context);
                declarations.insert(extension.key().to_string(), enriched);
            }
        }
        declarations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UppercaseExtension;

    impl Extension for UppercaseExtension {
        fn key(&self) -> &str {
            "demo"
        }
        fn enrich_declaration(&self, declaration: Value, _transport_context: &Value) -> Value {
            serde_json::json!({ "original": declaration, "tag": "enriched" })
        }
    }

    #[test]
    fn test_enrich_all_applies_registered_extension() {
        let mut system = ExtensionSystem::new();
        system.register(Box::new(UppercaseExtension));

        let mut declarations = serde_json::Map::new();
        declarations.insert("demo".to_string(), serde_json::json!({"required": true}));

        let enriched = system.enrich_all(declarations, &Value::Null);
        assert_eq!(enriched["demo"]["tag"], "enriched");
    }

    #[test]
    fn test_enrich_all_ignores_undeclared_extensions() {
        let system = ExtensionSystem::new();
        let mut declarations = serde_json::Map::new();
        declarations.insert("unregistered".to_string(), serde_json::json!({}));
        let enriched = system.enrich_all(declarations.clone(), &Value::Null);
        assert_eq!(enriched, declarations);
    }
}
