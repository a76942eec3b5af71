use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::scan::conditional_ranges;
use strum_macros::{AsRefStr, Display, EnumString};

static HEAD_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<head\b[^>]*>").unwrap_or_else(|e| unreachable!("head pattern is valid: {e}"))
});

static HEAD_CLOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</head\s*>").unwrap_or_else(|e| unreachable!("head pattern is valid: {e}"))
});

static BODY_CLOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</body\s*>").unwrap_or_else(|e| unreachable!("body pattern is valid: {e}"))
});

/// Ordered search/replace registry for the final page.
///
/// Every stage registers what a source tag should become; nothing touches
/// the document until [`OutputRewriter::apply`]. Registering the same
/// search text again overwrites the earlier replacement but keeps its
/// position in the order. Conditional comment blocks are never rewritten,
/// even when they contain a copy of a replaced tag.
#[derive(Debug, Clone, Default)]
pub struct OutputRewriter {
    entries: Vec<(String, String)>,
}

impl OutputRewriter {
    /// Create an empty rewriter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `search` to be replaced by `replace`.
    pub fn add_search_replace(&mut self, search: impl Into<String>, replace: impl Into<String>) {
        let search = search.into();
        let replace = replace.into();
        if let Some(entry) = self.entries.iter_mut().find(|(s, _)| *s == search) {
            entry.1 = replace;
        } else {
            self.entries.push((search, replace));
        }
    }

    /// The replacement registered for `search`, if any.
    #[must_use]
    pub fn get(&self, search: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| s == search)
            .map(|(_, r)| r.as_str())
    }

    /// Number of registered replacements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply every replacement, in registration order, to all occurrences
    /// outside conditional comments.
    #[must_use]
    pub fn apply(&self, html: &str) -> String {
        let mut out = String::with_capacity(html.len());
        let mut cursor = 0;
        for block in conditional_ranges(html) {
            out.push_str(&self.replace_all(&html[cursor..block.start]));
            out.push_str(&html[block.start..block.end]);
            cursor = block.end;
        }
        out.push_str(&self.replace_all(&html[cursor..]));
        out
    }

    fn replace_all(&self, segment: &str) -> String {
        let mut out = segment.to_string();
        for (search, replace) in &self.entries {
            if search.is_empty() || search == replace {
                continue;
            }
            out = out.replace(search.as_str(), replace);
        }
        out
    }
}

/// Named positions where generated markup is injected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Anchor {
    /// Start of `<head>`, before any page stylesheet.
    CriticalCss,
    /// Start of `<head>`, after critical CSS: loader configuration.
    Client,
    /// End of `<head>`.
    Header,
    /// End of `<body>`.
    Footer,
}

/// Markup queued per [`Anchor`].
#[derive(Debug, Clone, Default)]
pub struct Injections {
    slots: BTreeMap<Anchor, Vec<String>>,
}

impl Injections {
    /// Create an empty set of injections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue markup at an anchor. Markup at the same anchor keeps its
    /// insertion order.
    pub fn add(&mut self, anchor: Anchor, markup: impl Into<String>) {
        self.slots.entry(anchor).or_default().push(markup.into());
    }

    /// Everything queued at `anchor`, concatenated.
    #[must_use]
    pub fn get(&self, anchor: Anchor) -> Option<String> {
        self.slots.get(&anchor).map(|parts| parts.concat())
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.values().all(Vec::is_empty)
    }

    /// Place queued markup into `html`.
    ///
    /// Missing landmarks degrade in order: head-start falls back to before
    /// `</head>`, and anything without a landmark is appended.
    #[must_use]
    pub fn apply(&self, html: &str) -> String {
        if self.is_empty() {
            return html.to_string();
        }

        let head_close = HEAD_CLOSE.find(html).map(|m| m.start());
        let head_open = HEAD_OPEN
            .find(html)
            .map(|m| m.end())
            .filter(|&end| head_close.is_none_or(|close| end <= close))
            .or(head_close);
        let body_close = BODY_CLOSE.find_iter(html).last().map(|m| m.start());

        let mut inserts: Vec<(usize, Anchor, String)> = Vec::new();
        for (&anchor, parts) in &self.slots {
            if parts.is_empty() {
                continue;
            }
            let position = match anchor {
                Anchor::CriticalCss | Anchor::Client => head_open,
                Anchor::Header => head_close,
                Anchor::Footer => body_close,
            }
            .unwrap_or(html.len());
            inserts.push((position, anchor, parts.concat()));
        }
        inserts.sort_by_key(|(position, anchor, _)| (*position, *anchor));

        let mut out = String::with_capacity(html.len() + inserts.iter().map(|i| i.2.len()).sum::<usize>());
        let mut cursor = 0;
        for (position, _, markup) in inserts {
            out.push_str(&html[cursor..position]);
            out.push_str(&markup);
            cursor = position;
        }
        out.push_str(&html[cursor..]);
        out
    }
}
