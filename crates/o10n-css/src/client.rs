//! Configuration handed to the client-side loader.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

/// Page-level loader configuration, grouped by client module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientConfig {
    modules: Vec<String>,
    config: BTreeMap<String, Map<String, Value>>,
}

impl ClientConfig {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a client module (kept once, in request order).
    pub fn load_module(&mut self, name: &str) {
        if !self.modules.iter().any(|m| m == name) {
            self.modules.push(name.to_string());
        }
    }

    /// Requested modules.
    #[must_use]
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Set `key` of `module`, replacing any earlier value.
    pub fn set_config(&mut self, module: &str, key: &str, value: Value) {
        let _ = self
            .config
            .entry(module.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Value of `key` in `module`.
    #[must_use]
    pub fn get(&self, module: &str, key: &str) -> Option<&Value> {
        self.config.get(module)?.get(key)
    }

    /// True when no module was requested and nothing was configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.config.is_empty()
    }

    /// JSON form: `{"modules": [..], "config": {module: {..}}}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "modules": self.modules,
            "config": self.config,
        })
    }

    /// Inline `<script>` defining the configuration, or `None` when empty.
    #[must_use]
    pub fn script(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        // `</script>` inside a string literal would end the element early
        let json = self.to_json().to_string().replace("</", "<\\/");
        Some(format!("<script data-o10n>var o10n_config={json};</script>"))
    }
}
