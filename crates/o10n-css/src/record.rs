//! Per-stylesheet working records.

use crate::config::AsyncOverrides;

/// Where a stylesheet's CSS comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSource {
    /// `<link rel="stylesheet" href>`.
    Link {
        /// Current href (after URL rules, hooks and proxying).
        href: String,
    },
    /// `<style>` block.
    Inline {
        /// Trimmed CSS text.
        css: String,
        /// Attribute text of the opening tag.
        attrs: String,
    },
}

/// A minified artifact produced for a sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinifiedSheet {
    /// `src` cache hash.
    pub key: String,
    /// Fingerprint of the source the artifact was built from.
    pub fingerprint: String,
}

impl MinifiedSheet {
    /// Member hash used for concat keys; changes whenever the artifact
    /// or its source changes.
    #[must_use]
    pub fn member_hash(&self) -> String {
        o10n_common::hash_parts([self.key.as_str(), self.fingerprint.as_str()])
    }
}

/// A stylesheet moving through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct StylesheetRecord {
    /// The original tag, exactly as found in the page.
    pub tag: String,
    /// Link or inline source.
    pub source: SheetSource,
    /// Media query, `"all"` when none.
    pub media: String,
    /// Minify this sheet.
    pub minify: bool,
    /// Load this sheet asynchronously.
    pub is_async: bool,
    /// The href (or inline CSS) changed; the tag must be rewritten if it
    /// stays in the page.
    pub rewrite: bool,
    /// Proxy cache hash when the sheet was proxied.
    pub proxy: Option<String>,
    /// Minified artifact, once produced.
    pub minified: Option<MinifiedSheet>,
    /// Async options set by filter rules.
    pub overrides: AsyncOverrides,
    /// Byte offset of the tag in the page.
    pub offset: usize,
}

impl StylesheetRecord {
    /// Current href for links.
    #[must_use]
    pub fn href(&self) -> Option<&str> {
        match &self.source {
            SheetSource::Link { href } => Some(href),
            SheetSource::Inline { .. } => None,
        }
    }

    /// True for `<style>` blocks.
    #[must_use]
    pub const fn is_inline(&self) -> bool {
        matches!(self.source, SheetSource::Inline { .. })
    }
}
