//! Critical CSS file entries and their configuration section.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A critical CSS file and the conditions under which it applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalCssEntry {
    /// File name, relative to the critical CSS directory.
    pub file: String,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Load order; lower first, ties keep list order.
    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: i64,
    /// OR-groups of conditions. The entry always applies when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Value>,
}

impl CriticalCssEntry {
    /// An unconditional entry.
    #[must_use]
    pub fn new(file: impl Into<String>, priority: i64) -> Self {
        Self {
            file: file.into(),
            title: None,
            priority,
            conditions: Vec::new(),
        }
    }

    /// True when the entry has no condition tree.
    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Priorities may be stored as numbers or numeric strings.
fn lenient_priority<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[allow(clippy::cast_possible_truncation)]
    let priority = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(priority.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct Toggle {
    enabled: bool,
}

/// `critical` section of the option tree.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CriticalConfig {
    /// Inject critical CSS.
    pub enabled: bool,
    /// Candidate files in configured order.
    pub files: Vec<CriticalCssEntry>,
    /// Minify the selected CSS.
    #[serde(deserialize_with = "toggle")]
    pub minify: bool,
    /// Link a pushed artifact instead of inlining, on secure connections.
    pub http2: bool,
    /// Allow editor views without a privileged session.
    #[serde(deserialize_with = "toggle")]
    pub editor_public: bool,
    /// Base URL of the editor scripts and styles.
    pub editor_assets: Option<String>,
}

/// Accept both `true` and `{"enabled": true}`.
fn toggle<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Section(Toggle),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Flag(enabled) | Raw::Section(Toggle { enabled }) => enabled,
    })
}

impl CriticalConfig {
    /// Read the `critical` key of a full option document; absent means
    /// disabled.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error for a malformed section.
    pub fn from_document(document: &Value) -> Result<Self, serde_json::Error> {
        document
            .get("critical")
            .map_or_else(|| Ok(Self::default()), Self::deserialize)
    }

    /// True when there is anything to select from.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && !self.files.is_empty()
    }
}
