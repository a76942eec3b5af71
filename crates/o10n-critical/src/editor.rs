//! Critical CSS editor views.
//!
//! Three query parameters switch a page into an editor view:
//! - `o10n-css` replaces the page with a split view of the two iframes
//! - `o10n-no-css` renders the page without any stylesheet
//! - `o10n-full-css` renders the page with all stylesheets
//!
//! The iframe views also annotate the critical CSS with file references.

use std::sync::LazyLock;

use o10n_css::{HookAction, RenderContext, StylesheetHook};
use o10n_html::escape_attr;
use regex::Regex;
use strum_macros::{AsRefStr, Display};

static HEAD_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<head\b[^>]*>").unwrap_or_else(|e| unreachable!("head pattern is valid: {e}"))
});

/// Query parameters that belong to the editor, removed from iframe URLs.
const EDITOR_PARAMS: [&str; 4] = ["o10n-css", "o10n-no-css", "o10n-full-css", "output"];

/// Requested editor view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum ViewMode {
    /// Split view comparing both iframes.
    #[strum(serialize = "o10n-css")]
    Editor,
    /// The page without stylesheets.
    #[strum(serialize = "o10n-no-css")]
    NoCss,
    /// The page with every stylesheet.
    #[strum(serialize = "o10n-full-css")]
    FullCss,
}

/// Errors raised when opening an editor view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    /// Editor views are not public and the session is not privileged.
    #[error("No permission")]
    PermissionDenied,
}

fn query_keys(query: &str) -> impl Iterator<Item = &str> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').map_or(pair, |(key, _)| key))
}

impl ViewMode {
    /// The view selected by a query string, if any. The editor wins over
    /// the iframe views.
    #[must_use]
    pub fn from_query(query: &str) -> Option<Self> {
        let keys: Vec<&str> = query_keys(query).collect();
        [Self::Editor, Self::NoCss, Self::FullCss]
            .into_iter()
            .find(|mode| keys.contains(&mode.as_ref()))
    }

    /// True for the views rendered inside the editor iframes.
    #[must_use]
    pub const fn is_iframe(self) -> bool {
        matches!(self, Self::NoCss | Self::FullCss)
    }
}

/// Check access to an editor view.
///
/// # Errors
///
/// Returns [`ViewError::PermissionDenied`] unless the views are public or
/// the session is privileged.
pub const fn authorize(editor_public: bool, privileged: bool) -> Result<(), ViewError> {
    if editor_public || privileged {
        Ok(())
    } else {
        Err(ViewError::PermissionDenied)
    }
}

/// Stylesheet hook removing every stylesheet from the page.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteStylesheets;

impl StylesheetHook for DeleteStylesheets {
    fn stylesheet_pre(&self, _href: &str, _tag: &str) -> HookAction {
        HookAction::Delete
    }

    fn style_pre(&self, _css: &str, _tag: &str) -> HookAction {
        HookAction::Delete
    }
}

/// Documents the views leave untouched.
fn is_html(html: &str) -> bool {
    let lower = html.to_ascii_lowercase();
    lower.contains("<html") && !lower.contains("<xsl:stylesheet")
}

/// An editor view for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorView {
    mode: ViewMode,
    page_url: String,
    asset_url: String,
}

impl EditorView {
    /// Create a view of `page_url` (with its query string). Editor scripts
    /// are loaded from `asset_url`.
    #[must_use]
    pub fn new(mode: ViewMode, page_url: &str, asset_url: &str) -> Self {
        Self {
            mode,
            page_url: page_url.to_string(),
            asset_url: format!("{}/", asset_url.trim_end_matches('/')),
        }
    }

    /// The view mode.
    #[must_use]
    pub const fn mode(&self) -> ViewMode {
        self.mode
    }

    /// Register what the view needs before the pipeline runs.
    pub fn install(&self, ctx: &mut RenderContext) {
        if self.mode == ViewMode::NoCss {
            ctx.add_hook(DeleteStylesheets);
        }
    }

    /// The page URL with editor parameters replaced by `mode`'s.
    #[must_use]
    pub fn iframe_url(&self, mode: ViewMode) -> String {
        let (base, query) = self
            .page_url
            .split_once('?')
            .unwrap_or((self.page_url.as_str(), ""));
        let mut pairs: Vec<&str> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let key = pair.split_once('=').map_or(*pair, |(key, _)| key);
                !EDITOR_PARAMS.contains(&key)
            })
            .collect();
        pairs.push(mode.as_ref());
        format!("{base}?{}", pairs.join("&"))
    }

    /// Transform the final page. Non-HTML documents pass through.
    #[must_use]
    pub fn apply(&self, html: &str) -> String {
        if !is_html(html) {
            return html.to_string();
        }
        match self.mode {
            ViewMode::Editor => self.editor_page(),
            ViewMode::NoCss | ViewMode::FullCss => {
                let script = self.iframe_script();
                match HEAD_OPEN.find(html) {
                    Some(head) => format!("{}{script}{}", &html[..head.end()], &html[head.end()..]),
                    None => format!("{html}{script}"),
                }
            }
        }
    }

    fn iframe_script(&self) -> String {
        let path = serde_json::Value::String(self.asset_url.clone());
        format!(
            "<script>var o10n_css_path={path};</script><script src=\"{}public/js/view-css-editor-iframe.js\"></script>",
            escape_attr(&self.asset_url)
        )
    }

    fn editor_page(&self) -> String {
        let assets = escape_attr(&self.asset_url);
        let no_css = escape_attr(&self.iframe_url(ViewMode::NoCss));
        let full_css = escape_attr(&self.iframe_url(ViewMode::FullCss));
        format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Critical CSS Editor</title>\
             <link rel=\"stylesheet\" href=\"{assets}public/css/critical-css-editor.css\"></head>\
             <body class=\"o10n-critical-css-editor\">\
             <div class=\"o10n-pane\"><iframe id=\"o10n-no-css\" src=\"{no_css}\"></iframe></div>\
             <div class=\"o10n-pane\"><iframe id=\"o10n-full-css\" src=\"{full_css}\"></iframe></div>\
             <script src=\"{assets}public/js/critical-css-editor.js\"></script></body></html>"
        )
    }
}
