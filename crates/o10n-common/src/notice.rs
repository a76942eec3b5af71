//! Operator notices collected during a render.
//!
//! Configuration mistakes (malformed filter patterns, unknown critical CSS
//! predicates) must not abort a page render. They are recorded here once
//! per unique message, logged through `tracing`, and surfaced to the
//! operator by the caller after the render.

use std::collections::HashSet;

/// A single deduplicated notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Subsystem that raised the notice (e.g. `"filter"`, `"critical"`).
    pub component: String,
    /// Human readable message.
    pub message: String,
}

/// Per-render collection of operator notices.
#[derive(Debug, Default)]
pub struct Notices {
    seen: HashSet<String>,
    entries: Vec<Notice>,
}

impl Notices {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a notice (kept once per unique component/message pair).
    ///
    /// # Example
    /// ```
    /// let mut notices = o10n_common::Notices::new();
    /// notices.warn_once("filter", "invalid regex `(`");
    /// notices.warn_once("filter", "invalid regex `(`");
    /// assert_eq!(notices.len(), 1);
    /// ```
    pub fn warn_once(&mut self, component: &str, message: impl Into<String>) {
        let message = message.into();
        let key = format!("[{component}] {message}");
        if !self.seen.insert(key) {
            return;
        }
        tracing::warn!(component, "{message}");
        self.entries.push(Notice {
            component: component.to_string(),
            message,
        });
    }

    /// Iterate over recorded notices in the order they were raised.
    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.entries.iter()
    }

    /// Number of unique notices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every notice (call between renders when reusing a collection).
    pub fn clear(&mut self) {
        self.seen.clear();
        self.entries.clear();
    }
}
