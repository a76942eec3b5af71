//! Minifier seam and the lightningcss-backed implementation.

use std::convert::Infallible;
use std::fmt::Write as _;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::values::url::Url;
use lightningcss::visitor::{Visit, VisitTypes, Visitor};
use o10n_common::url::{is_absolute, resolve_url};
use serde::{Deserialize, Serialize};

/// One input of a minification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCss {
    /// Display name (file name or `inline-<hash>`), used in errors.
    pub name: String,
    /// CSS text.
    pub css: String,
    /// Media query to wrap the source in; `None` or `"all"` for none.
    pub media: Option<String>,
    /// URL the source was loaded from. Relative `url()` references are
    /// rebased against it when set.
    pub base_url: Option<String>,
}

impl SourceCss {
    /// A source without media wrapping or rebasing.
    #[must_use]
    pub fn new(name: impl Into<String>, css: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            css: css.into(),
            media: None,
            base_url: None,
        }
    }
}

/// Errors from a minifier.
#[derive(Debug, thiserror::Error)]
pub enum MinifyError {
    /// A source could not be parsed.
    #[error("failed to parse {name}: {message}")]
    Parse {
        /// Source name.
        name: String,
        /// Parser message.
        message: String,
    },
    /// Structural minification failed.
    #[error("failed to minify: {0}")]
    Minify(String),
    /// The result could not be serialized.
    #[error("failed to print minified CSS: {0}")]
    Print(String),
}

/// Something that turns CSS sources into one minified stylesheet.
pub trait Minifier {
    /// Short name, emitted in artifact footers.
    fn name(&self) -> &str;

    /// Identifies the minifier and every option that changes its output.
    /// Part of every minify cache key.
    fn fingerprint(&self) -> String;

    /// Concatenate and minify `sources` in order.
    ///
    /// # Errors
    ///
    /// Returns a [`MinifyError`] when any source is unusable.
    fn minify(&self, sources: &[SourceCss]) -> Result<String, MinifyError>;
}

/// How aggressively [`LightningMinifier`] rewrites stylesheets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinifyLevel {
    /// Merge rules, shorten values and strip whitespace.
    #[default]
    Full,
    /// Only strip whitespace and comments.
    Whitespace,
}

/// [`Minifier`] built on lightningcss.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightningMinifier {
    level: MinifyLevel,
}

impl LightningMinifier {
    /// Create a minifier with the given level.
    #[must_use]
    pub const fn new(level: MinifyLevel) -> Self {
        Self { level }
    }
}

/// Invalid rules are errors rather than silently dropped, so callers fall
/// back to the untouched source.
fn parser_options<'i>(name: &str) -> ParserOptions<'i> {
    ParserOptions {
        filename: name.to_string(),
        error_recovery: false,
        ..ParserOptions::default()
    }
}

/// Rebases relative `url()` references against the source URL.
struct UrlRebaser<'a> {
    base: &'a str,
}

impl<'i> Visitor<'i> for UrlRebaser<'_> {
    type Error = Infallible;

    fn visit_types(&self) -> VisitTypes {
        lightningcss::visit_types!(URLS)
    }

    fn visit_url(&mut self, url: &mut Url<'i>) -> Result<(), Self::Error> {
        if let Some(rebased) = rebase(&url.url, self.base) {
            url.url = rebased.into();
        }
        Ok(())
    }
}

/// Resolve a relative reference against `base`. Absolute, root-relative,
/// fragment and `data:` references stay as they are.
fn rebase(reference: &str, base: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty()
        || reference.starts_with('#')
        || reference.starts_with('/')
        || is_absolute(reference)
    {
        return None;
    }
    Some(resolve_url(reference, Some(base)))
}

fn rebase_urls(source: &SourceCss, base: &str) -> Result<String, MinifyError> {
    let mut sheet = StyleSheet::parse(&source.css, parser_options(&source.name)).map_err(|e| {
        MinifyError::Parse {
            name: source.name.clone(),
            message: e.to_string(),
        }
    })?;
    let mut rebaser = UrlRebaser { base };
    sheet.visit(&mut rebaser).unwrap_or_else(|never| match never {});
    sheet
        .to_css(PrinterOptions::default())
        .map(|out| out.code)
        .map_err(|e| MinifyError::Print(e.to_string()))
}

impl Minifier for LightningMinifier {
    fn name(&self) -> &str {
        "lightningcss"
    }

    fn fingerprint(&self) -> String {
        format!("lightningcss:{:?}", self.level)
    }

    fn minify(&self, sources: &[SourceCss]) -> Result<String, MinifyError> {
        let mut combined = String::new();
        for source in sources {
            let css = match source.base_url.as_deref() {
                Some(base) => rebase_urls(source, base)?,
                None => source.css.clone(),
            };
            match source.media.as_deref().map(str::trim) {
                Some(media) if !media.is_empty() && media != "all" => {
                    let _ = write!(combined, "@media {media}{{{css}}}");
                }
                _ => combined.push_str(&css),
            }
            combined.push('\n');
        }

        let mut sheet = StyleSheet::parse(&combined, parser_options("concat")).map_err(|e| {
            MinifyError::Parse {
                name: sources
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                message: e.to_string(),
            }
        })?;
        if self.level == MinifyLevel::Full {
            sheet
                .minify(MinifyOptions::default())
                .map_err(|e| MinifyError::Minify(e.to_string()))?;
        }
        sheet
            .to_css(PrinterOptions {
                minify: true,
                ..PrinterOptions::default()
            })
            .map(|out| out.code)
            .map_err(|e| MinifyError::Print(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebase_only_touches_relative_references() {
        let base = "https://example.com/theme/css/main.css";
        assert_eq!(
            rebase("../img/a.png", base).as_deref(),
            Some("https://example.com/theme/img/a.png")
        );
        assert_eq!(rebase("/img/a.png", base), None);
        assert_eq!(rebase("data:image/png;base64,AA==", base), None);
        assert_eq!(rebase("#filter", base), None);
        assert_eq!(rebase("https://cdn.test/x.png", base), None);
    }

    #[test]
    fn test_minify_wraps_media_sources() {
        let mut print = SourceCss::new("print.css", "b {\n  color: blue;\n}");
        print.media = Some("print".to_string());
        let mut all = SourceCss::new("all.css", "a { color: red; }");
        all.media = Some("all".to_string());

        let css = LightningMinifier::default()
            .minify(&[all, print])
            .expect("valid css");
        assert!(css.starts_with("a{color:red}@media print{b{color:"));
        assert!(!css.contains("@media all"));
    }

    #[test]
    fn test_minify_rebases_relative_urls() {
        let mut source = SourceCss::new("main.css", "a { background: url(../img/a.png) }");
        source.base_url = Some("https://example.com/theme/css/main.css".to_string());

        let css = LightningMinifier::new(MinifyLevel::Whitespace)
            .minify(&[source])
            .expect("valid css");
        assert!(css.contains("https://example.com/theme/img/a.png"));
        assert!(!css.contains(".."));
    }

    #[test]
    fn test_minify_rejects_invalid_rules() {
        let err = LightningMinifier::default()
            .minify(&[SourceCss::new("bad.css", "..broken { color: red }")])
            .expect_err("invalid selector");
        assert!(matches!(err, MinifyError::Parse { ref name, .. } if name == "bad.css"));
    }
}
