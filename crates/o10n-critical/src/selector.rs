//! Critical CSS selection and output.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use o10n_common::url::remove_host;
use o10n_common::{Notices, content_hash, hash_parts};
use o10n_css::cache::{ArtifactMeta, CacheKind, DOMAIN, preserve_threshold};
use o10n_css::{RenderContext, Services, SourceCss};
use o10n_html::Anchor;

use crate::condition::ConditionEvaluator;
use crate::entry::{CriticalConfig, CriticalCssEntry};
use crate::predicate::PredicateRegistry;

/// Cache group label of critical CSS artifacts.
pub const CRITICAL_GROUP: &str = "critical";

/// What was injected for one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalOutput {
    /// Files that were included, in output order.
    pub files: Vec<String>,
    /// Markup placed at the critical CSS anchor.
    pub markup: String,
    /// Artifact hash when the CSS is cached.
    pub hash: Option<String>,
}

/// Selects, builds and injects critical CSS.
pub struct CriticalCssSelector<'a> {
    config: &'a CriticalConfig,
    directory: PathBuf,
    registry: &'a PredicateRegistry,
    services: Services<'a>,
    secure: bool,
    debug_view: bool,
}

impl<'a> CriticalCssSelector<'a> {
    /// Create a selector reading files from `directory`.
    #[must_use]
    pub fn new(
        config: &'a CriticalConfig,
        directory: impl Into<PathBuf>,
        registry: &'a PredicateRegistry,
        services: Services<'a>,
    ) -> Self {
        Self {
            config,
            directory: directory.into(),
            registry,
            services,
            secure: false,
            debug_view: false,
        }
    }

    /// Mark the connection as TLS, which server push requires.
    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Annotate the output for the editor iframes.
    #[must_use]
    pub const fn debug_view(mut self, debug_view: bool) -> Self {
        self.debug_view = debug_view;
        self
    }

    /// Active entries in output order: ascending priority, ties in list
    /// order.
    pub fn select(&self, notices: &mut Notices) -> Vec<&'a CriticalCssEntry> {
        let mut evaluator = ConditionEvaluator::new(self.registry);
        let config: &'a CriticalConfig = self.config;
        let mut active: Vec<&'a CriticalCssEntry> = config
            .files
            .iter()
            .filter(|entry| evaluator.matches(&entry.conditions, notices))
            .collect();
        active.sort_by_key(|entry| entry.priority);
        tracing::debug!(
            candidates = config.files.len(),
            active = active.len(),
            predicate_calls = evaluator.calls(),
            "selected critical CSS"
        );
        active
    }

    /// Join the contents of `entries` with single spaces. Missing files are
    /// skipped.
    #[must_use]
    pub fn build_css(&self, entries: &[&CriticalCssEntry]) -> String {
        let parts: Vec<String> = entries
            .iter()
            .filter_map(|entry| {
                let path = self.directory.join(&entry.file);
                let source = match fs::read_to_string(&path) {
                    Ok(source) => source,
                    Err(err) => {
                        tracing::debug!(path = %path.display(), %err, "critical CSS file not readable");
                        return None;
                    }
                };
                let source = source.trim();
                Some(if self.debug_view {
                    format!("{}{source}", annotation(entry))
                } else {
                    source.to_string()
                })
            })
            .collect();
        parts.join(" ").trim().to_string()
    }

    /// Select, build and register the critical CSS on `ctx`.
    ///
    /// Returns `None` when nothing applies to this page.
    pub fn render(&self, ctx: &mut RenderContext) -> Option<CriticalOutput> {
        if !self.config.is_active() {
            return None;
        }
        let entries = self.select(&mut ctx.notices);
        if entries.is_empty() {
            return None;
        }
        let mut css = self.build_css(&entries);
        if css.is_empty() {
            return None;
        }

        // STEP 1: Optional minification through the concat cache.
        let mut hash = None;
        if self.config.minify {
            let (minified, key) = self.minify(css);
            css = minified;
            hash = key;
        }

        // The minified artifact lacks the editor header, so the debug
        // view links its own copy.
        if self.debug_view {
            css = format!(
                "/**\n * Critical CSS Editor\n *\n * The critical CSS is annotated with file references.\n * Source files are located in {}\n */\n{css}",
                self.directory.display()
            );
            hash = None;
        }

        // STEP 2: Pushed link or inline block.
        let id = if self.debug_view { "id=\"o10n-critical-css\" " } else { "" };
        let push = self.services.push.filter(|_| self.config.http2 && self.secure);
        let linked = push.and_then(|push| {
            let key = hash.clone().or_else(|| self.store_plain(&css))?;
            let url = remove_host(&self.services.cache.url(DOMAIN, CacheKind::Concat, &key));
            if !push.push(&url, "style") {
                tracing::debug!(%url, "server push not accepted");
            }
            Some((key, url))
        });
        let markup = match linked {
            Some((key, url)) => {
                hash = Some(key);
                format!("<link {id}data-o10n rel=\"stylesheet\" href=\"{url}\">")
            }
            None => format!("<style {id}data-o10n=\"{CRITICAL_GROUP}\">{css}</style>"),
        };

        ctx.injections.add(Anchor::CriticalCss, markup.clone());
        Some(CriticalOutput {
            files: entries.iter().map(|entry| entry.file.clone()).collect(),
            markup,
            hash,
        })
    }

    /// Minified CSS and its artifact hash. Falls back to the input when
    /// the minifier fails.
    fn minify(&self, css: String) -> (String, Option<String>) {
        let cache = self.services.cache;
        let minifier = self.services.minifier;
        let hash = hash_parts([css.as_str(), minifier.fingerprint().as_str()]);

        if cache.exists(DOMAIN, CacheKind::Concat, &hash) {
            if let Err(err) = cache.preserve(DOMAIN, CacheKind::Concat, &hash, preserve_threshold()) {
                tracing::warn!(%hash, %err, "failed to refresh artifact timestamp");
            }
            return match cache.get(DOMAIN, CacheKind::Concat, &hash) {
                Ok(Some(cached)) if !cached.is_empty() => (cached, Some(hash)),
                Ok(_) => (css, None),
                Err(err) => {
                    tracing::warn!(%hash, %err, "failed to read critical CSS artifact");
                    (css, None)
                }
            };
        }

        let minified = match minifier.minify(&[SourceCss::new(CRITICAL_GROUP, css.as_str())]) {
            Ok(minified) => minified,
            Err(err) => {
                tracing::warn!(%err, "critical CSS minification failed");
                return (css, None);
            }
        };
        match cache.put(
            DOMAIN,
            CacheKind::Concat,
            &hash,
            &minified,
            &ArtifactMeta::group(Some(CRITICAL_GROUP)),
        ) {
            Ok(_) => (minified, Some(hash)),
            Err(err) => {
                tracing::warn!(%hash, %err, "failed to store critical CSS");
                (minified, None)
            }
        }
    }

    /// Store unminified CSS so it can be linked; `None` when the store
    /// fails.
    fn store_plain(&self, css: &str) -> Option<String> {
        let cache = self.services.cache;
        let hash = content_hash(css);
        if cache.exists(DOMAIN, CacheKind::Concat, &hash) {
            if let Err(err) = cache.preserve(DOMAIN, CacheKind::Concat, &hash, preserve_threshold()) {
                tracing::warn!(%hash, %err, "failed to refresh artifact timestamp");
            }
            return Some(hash);
        }
        match cache.put(
            DOMAIN,
            CacheKind::Concat,
            &hash,
            css,
            &ArtifactMeta::group(Some(CRITICAL_GROUP)),
        ) {
            Ok(_) => Some(hash),
            Err(err) => {
                tracing::warn!(%hash, %err, "failed to store critical CSS");
                None
            }
        }
    }
}

/// Editor comment naming the file an excerpt came from.
fn annotation(entry: &CriticalCssEntry) -> String {
    let mut out = format!("\n\n/*\n * @file {}", entry.file);
    if let Some(title) = &entry.title {
        let _ = write!(out, "\n * @title {title}");
    }
    let _ = write!(out, "\n * @priority {}", entry.priority);
    if !entry.conditions.is_empty() {
        let conditions = serde_json::to_string(&entry.conditions).unwrap_or_default();
        let _ = write!(out, "\n * @conditions {conditions}");
    }
    out.push_str("\n */\n");
    out
}
