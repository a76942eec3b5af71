//! Stylesheet extraction.

use o10n_common::url::valid_protocol;
use o10n_html::{extract_href, find_link_tags, find_style_blocks, parse_media_attr};

use crate::cache::DOMAIN;
use crate::config::{AsyncOverrides, UrlAction};
use crate::context::RenderContext;
use crate::filter::FilterDecision;
use crate::hooks::{self, HookAction};
use crate::pipeline::CssOptimizer;
use crate::record::{SheetSource, StylesheetRecord};

impl CssOptimizer<'_> {
    /// Scan `html` for stylesheets and build their records in document
    /// order.
    ///
    /// Ignored tags produce no record; deleted tags are registered for
    /// removal on `ctx`. Inline `<style>` blocks are only collected when
    /// inline concatenation is enabled.
    pub fn extract(&self, html: &str, ctx: &mut RenderContext) -> Vec<StylesheetRecord> {
        let mut records: Vec<StylesheetRecord> = find_link_tags(html)
            .into_iter()
            .filter(|link| link.is_stylesheet())
            .filter_map(|link| self.extract_link(link.tag, link.offset, ctx))
            .collect();

        let inline_filter = self
            .settings()
            .concat
            .as_ref()
            .and_then(|concat| concat.inline.as_ref());
        if let Some(filter) = inline_filter {
            for block in find_style_blocks(html) {
                let css = block.css.trim();
                if css.is_empty() {
                    ctx.rewriter.add_search_replace(block.tag, "");
                    continue;
                }
                let (css, rewrite) = match hooks::run(&ctx.hooks, css, |hook, css| {
                    hook.style_pre(css, block.tag)
                }) {
                    HookAction::Keep => (css.to_string(), false),
                    HookAction::Ignore => continue,
                    HookAction::Delete => {
                        ctx.rewriter.add_search_replace(block.tag, "");
                        continue;
                    }
                    HookAction::Replace(css) => (css, true),
                };
                if filter.as_ref().is_some_and(|f| !f.matches(block.tag)) {
                    continue;
                }
                records.push(StylesheetRecord {
                    tag: block.tag.to_string(),
                    source: SheetSource::Inline {
                        css,
                        attrs: block.attrs.to_string(),
                    },
                    media: block.media(),
                    minify: false,
                    is_async: false,
                    rewrite,
                    proxy: None,
                    minified: None,
                    overrides: AsyncOverrides::default(),
                    offset: block.offset,
                });
            }
        }

        records.sort_by_key(|record| record.offset);
        tracing::debug!(count = records.len(), "extracted stylesheets");
        records
    }

    fn extract_link(&self, tag: &str, offset: usize, ctx: &mut RenderContext) -> Option<StylesheetRecord> {
        let settings = self.settings();
        let original = extract_href(tag)?;
        let mut href = self.site().translate_protocol(original);
        let mut rewrite = false;

        // STEP 1: URL rules. Ignore and delete end processing.
        for rule in &settings.url_filter {
            if !rule.pattern.matches(&href) {
                continue;
            }
            match &rule.action {
                Some(UrlAction::Ignore) => return None,
                Some(UrlAction::Delete) => {
                    ctx.rewriter.add_search_replace(tag, "");
                    return None;
                }
                Some(UrlAction::Replace(replacement)) => {
                    href.clone_from(replacement);
                    rewrite = true;
                }
                None => {}
            }
        }

        // STEP 2: Hooks.
        match hooks::run(&ctx.hooks, &href, |hook, href| hook.stylesheet_pre(href, tag)) {
            HookAction::Keep => {}
            HookAction::Ignore => return None,
            HookAction::Delete => {
                ctx.rewriter.add_search_replace(tag, "");
                return None;
            }
            HookAction::Replace(replacement) => {
                if replacement != href {
                    href = replacement;
                    rewrite = true;
                }
            }
        }

        // STEP 3: Minify filter.
        let minify = settings
            .minify
            .as_ref()
            .is_some_and(|m| m.filter.as_ref().is_none_or(|f| f.matches(tag)));

        // STEP 4: Async rules.
        let mut media = parse_media_attr(tag);
        let (is_async, overrides) = match &settings.async_load {
            None => (false, AsyncOverrides::default()),
            Some(page) => match page.filter.as_ref().map(|filter| filter.evaluate(tag)) {
                None => (true, AsyncOverrides::default()),
                Some(FilterDecision::Matched(rule)) => {
                    AsyncOverrides::from_rule(rule.options(), page, &mut ctx.notices)
                }
                Some(decision) => (decision.selected(page.filter_mode), AsyncOverrides::default()),
            },
        };
        if let Some(custom) = &overrides.media {
            media.clone_from(custom);
        }

        // STEP 5: Proxy remote sheets that are not minified.
        let mut proxy = None;
        let proxied = settings.proxy.as_ref().is_some_and(|filter| {
            !minify
                && !self.site().is_same_host(&href)
                && valid_protocol(&href)
                && filter.as_ref().is_none_or(|f| f.matches(tag))
        });
        if proxied {
            match self.services().proxy.proxify(DOMAIN, &href) {
                Ok(file) if file.url != href => {
                    href = file.url;
                    proxy = Some(file.hash);
                    rewrite = true;
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(%href, %err, "failed to proxy stylesheet"),
            }
        }

        Some(StylesheetRecord {
            tag: tag.to_string(),
            source: SheetSource::Link { href },
            media,
            minify,
            is_async,
            rewrite,
            proxy,
            minified: None,
            overrides,
            offset,
        })
    }
}
