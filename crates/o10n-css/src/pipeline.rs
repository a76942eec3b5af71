//! Pipeline driver.
//!
//! [`CssOptimizer::process_html`] runs the stages in order:
//!
//! 1. extract `<link>`/`<style>` records (URL rules, hooks, filters, proxy)
//! 2. minify eligible sheets into `src` artifacts
//! 3. assign minified and inline sheets to concat groups
//! 4. rewrite, defer or drop the remaining sheets one by one
//! 5. build one `concat` artifact per group
//! 6. encode the async list, preload hints and `<noscript>` fallbacks
//!
//! Every change is registered on the [`RenderContext`]; the page itself is
//! only rewritten by [`RenderContext::finish`].

use o10n_common::Site;
use o10n_html::{Anchor, escape_attr, replace_href};
use serde_json::json;

use crate::cache::{CacheKind, DOMAIN};
use crate::concat::Grouper;
use crate::config::{AsyncOverrides, AsyncPosition, AsyncSettings, LoadPosition, Settings};
use crate::context::{RenderContext, Services};
use crate::encoder::{AsyncEntry, EntryKind, encode_list};
use crate::record::{SheetSource, StylesheetRecord};

/// Client module holding the stylesheet loader configuration.
pub const CLIENT_MODULE: &str = "css";

/// A stylesheet URL that also gets `<link rel="preload">` and/or
/// `<noscript>` markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackLink {
    /// Delivered URL.
    pub url: String,
    /// Media query, `"all"` for none.
    pub media: String,
    /// Emit a preload hint.
    pub rel_preload: bool,
    /// Emit a `<noscript>` link.
    pub noscript: bool,
}

impl FallbackLink {
    fn media_attr(&self) -> String {
        if self.media.is_empty() || self.media == "all" {
            String::new()
        } else {
            format!(" media=\"{}\"", escape_attr(&self.media))
        }
    }

    /// `<link rel="preload" as="style">` switching itself to a stylesheet
    /// once loaded.
    #[must_use]
    pub fn preload_tag(&self) -> String {
        format!(
            "<link rel=\"preload\" as=\"style\" href=\"{}\"{} onload=\"this.rel='stylesheet';\">",
            escape_attr(&self.url),
            self.media_attr()
        )
    }

    /// Plain stylesheet link used inside `<noscript>`.
    #[must_use]
    pub fn stylesheet_tag(&self) -> String {
        format!(
            "<link rel=\"stylesheet\" href=\"{}\"{}>",
            escape_attr(&self.url),
            self.media_attr()
        )
    }
}

/// What the pipeline emits at one document position.
#[derive(Debug, Default)]
struct Slot {
    entries: Vec<AsyncEntry>,
    fallbacks: Vec<FallbackLink>,
}

/// Counters describing one [`CssOptimizer::process_html`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// Records extracted from the page.
    pub stylesheets: usize,
    /// Sheets with a minified artifact.
    pub minified: usize,
    /// Concat artifacts referenced by the page.
    pub groups: usize,
    /// Entries in the async list.
    pub async_entries: usize,
}

/// Stylesheet optimizer for one site.
pub struct CssOptimizer<'a> {
    settings: Settings,
    site: &'a Site,
    services: Services<'a>,
}

impl<'a> CssOptimizer<'a> {
    /// Create an optimizer from validated settings.
    #[must_use]
    pub const fn new(settings: Settings, site: &'a Site, services: Services<'a>) -> Self {
        Self {
            settings,
            site,
            services,
        }
    }

    /// Validated settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The site being optimized.
    #[must_use]
    pub const fn site(&self) -> &'a Site {
        self.site
    }

    /// External services.
    #[must_use]
    pub const fn services(&self) -> Services<'a> {
        self.services
    }

    /// Request client modules and write the page-level loader defaults.
    pub fn setup_client(&self, ctx: &mut RenderContext) {
        if !self.settings.is_active() {
            return;
        }
        let client = &mut ctx.client;
        client.load_module("responsive");
        if self.settings.proxy.is_some() {
            client.load_module("proxy");
        }
        client.load_module(CLIENT_MODULE);

        let Some(page) = &self.settings.async_load else {
            return;
        };
        client.set_config(CLIENT_MODULE, "async", json!(true));

        if page.load_position == LoadPosition::Timing {
            client.load_module("timed-exec");
            client.set_config(
                CLIENT_MODULE,
                "load_position",
                json!(LoadPosition::Timing.index()),
            );
            if let Some(timing) = &page.load_timing {
                if let Some(module) = timing.kind.client_module() {
                    client.load_module(module);
                }
                client.set_config(CLIENT_MODULE, "load_timing", timing.descriptor());
            }
        }

        if let Some(timing) = &page.render_timing {
            client.load_module("timed-exec");
            if let Some(module) = timing.kind.client_module() {
                client.load_module(module);
            }
            client.set_config(CLIENT_MODULE, "render_timing", timing.descriptor());
        }

        if let Some(storage) = &page.local_storage {
            client.load_module("localstorage");
            client.set_config(CLIENT_MODULE, "localStorage", json!(true));
            for (key, value) in storage.named_entries() {
                client.set_config(CLIENT_MODULE, &format!("localStorage_{key}"), value);
            }
        }

        if page.request_animation_frame {
            client.set_config(CLIENT_MODULE, "requestAnimationFrame", json!(true));
        }
    }

    /// Run the pipeline over `html`, registering every change on `ctx`.
    pub fn process_html(&self, html: &str, ctx: &mut RenderContext) -> RenderReport {
        let mut report = RenderReport::default();
        if html.is_empty() {
            return report;
        }

        // STEP 1: Extract.
        let mut records = self.extract(html, ctx);
        report.stylesheets = records.len();
        if records.is_empty() {
            return report;
        }

        // STEP 2: Minify.
        self.minify_stylesheets(&mut records, ctx);
        report.minified = records.iter().filter(|r| r.minified.is_some()).count();

        // STEP 3/4: Group or deliver each sheet.
        let page = self.settings.async_load.as_ref();
        let mut grouper = self
            .settings
            .concat
            .as_ref()
            .map(|concat| Grouper::new(concat, page));
        let mut slots: Vec<Slot> = records.iter().map(|_| Slot::default()).collect();

        for (position, record) in records.iter().enumerate() {
            if let Some(grouper) = grouper.as_mut() {
                if grouper.assign(record, position, &mut ctx.notices) {
                    ctx.rewriter.add_search_replace(record.tag.clone(), "");
                    continue;
                }
            }
            if let SheetSource::Inline { css, attrs } = &record.source {
                if record.rewrite {
                    ctx.rewriter
                        .add_search_replace(record.tag.clone(), format!("<style{attrs}>{css}</style>"));
                }
                continue;
            }
            match page.filter(|_| record.is_async) {
                Some(page) => self.defer_sheet(record, page, &mut slots[position], ctx),
                None => self.rewrite_sheet(record, ctx),
            }
        }

        // STEP 5: Concat artifacts.
        for group in grouper.map(Grouper::into_groups).unwrap_or_default() {
            let hash = match self.build_group(&group) {
                Ok(hash) => hash,
                Err(skip) => {
                    tracing::warn!(group = %group.key, %skip, "concat group skipped");
                    for member in &group.members {
                        ctx.rewriter.add_search_replace(member.tag.clone(), member.tag.clone());
                    }
                    continue;
                }
            };
            report.groups += 1;
            let url = self.deliver(&self.services.cache.url(DOMAIN, CacheKind::Concat, &hash));
            let media = group.media.clone().unwrap_or_else(|| "all".to_string());
            match page.filter(|_| group.is_async) {
                Some(page) => {
                    let slot = &mut slots[group.last_position()];
                    push_fallback(slot, page, &group.overrides, &url, &media);
                    slot.entries.push(AsyncEntry {
                        kind: EntryKind::Concat,
                        id: hash,
                        original_urls: group.original_urls(),
                        media,
                        overrides: group.overrides.clone(),
                    });
                }
                None => {
                    let link = FallbackLink {
                        url,
                        media,
                        rel_preload: false,
                        noscript: false,
                    };
                    if let Some(last) = group.last_member() {
                        ctx.rewriter
                            .add_search_replace(last.tag.clone(), link.stylesheet_tag());
                    }
                }
            }
        }

        // STEP 6: Async list and fallbacks.
        let (entries, fallbacks): (Vec<_>, Vec<_>) = slots
            .into_iter()
            .map(|slot| (slot.entries, slot.fallbacks))
            .unzip();
        let entries: Vec<AsyncEntry> = entries.into_iter().flatten().collect();
        let fallbacks: Vec<FallbackLink> = fallbacks.into_iter().flatten().collect();
        report.async_entries = entries.len();

        if let Some(page) = page {
            if !entries.is_empty() {
                encode_list(&entries, page, self.settings.debug).apply(&mut ctx.client);
            }
            self.inject_fallbacks(&fallbacks, page, ctx);
        }

        tracing::debug!(
            stylesheets = report.stylesheets,
            minified = report.minified,
            groups = report.groups,
            async_entries = report.async_entries,
            "processed stylesheets"
        );
        report
    }

    /// Remove a sheet from the page and queue it for the loader.
    fn defer_sheet(
        &self,
        record: &StylesheetRecord,
        page: &AsyncSettings,
        slot: &mut Slot,
        ctx: &mut RenderContext,
    ) {
        let href = record.href().unwrap_or_default();
        let (kind, id, url) = if let Some(minified) = &record.minified {
            let url = self.deliver(&self.services.cache.url(DOMAIN, CacheKind::Src, &minified.key));
            (EntryKind::Src, minified.key.clone(), url)
        } else if let Some(proxy) = &record.proxy {
            (EntryKind::Proxy, proxy.clone(), self.deliver(href))
        } else {
            let url = self.deliver(href);
            (EntryKind::Url, url.clone(), url)
        };
        let media = record
            .overrides
            .media
            .clone()
            .unwrap_or_else(|| record.media.clone());

        push_fallback(slot, page, &record.overrides, &url, &media);
        slot.entries.push(AsyncEntry {
            kind,
            id,
            original_urls: vec![href.to_string()],
            media,
            overrides: record.overrides.clone(),
        });
        ctx.rewriter.add_search_replace(record.tag.clone(), "");
    }

    /// Point a render-blocking sheet at its minified or delivered URL.
    fn rewrite_sheet(&self, record: &StylesheetRecord, ctx: &mut RenderContext) {
        let Some(mut href) = record.href().map(str::to_string) else {
            return;
        };
        let mut rewrite = record.rewrite;
        if let Some(minified) = &record.minified {
            href = self.services.cache.url(DOMAIN, CacheKind::Src, &minified.key);
            rewrite = true;
        }
        let delivered = self.deliver(&href);
        if delivered != href {
            rewrite = true;
        }
        if rewrite {
            ctx.rewriter
                .add_search_replace(record.tag.clone(), replace_href(&record.tag, &delivered));
        }
    }

    /// Apply the CDN rewrite and HTTP/2 push to an emitted URL.
    #[must_use]
    pub fn deliver(&self, url: &str) -> String {
        let delivered = self
            .settings
            .cdn
            .as_ref()
            .map_or_else(|| url.to_string(), |cdn| cdn.rewrite.apply(self.site, url));

        if let (Some(filter), Some(push)) = (&self.settings.http2_push, self.services.push) {
            if filter.as_ref().is_none_or(|f| f.matches(url)) {
                let pushed = match &self.settings.cdn {
                    Some(cdn) if cdn.http2_push => delivered.as_str(),
                    _ => url,
                };
                if !push.push(pushed, "style") {
                    tracing::debug!(url = pushed, "server push not accepted");
                }
            }
        }
        delivered
    }

    fn inject_fallbacks(&self, fallbacks: &[FallbackLink], page: &AsyncSettings, ctx: &mut RenderContext) {
        let (preload_anchor, noscript_anchor) = match page.position {
            AsyncPosition::Header => (Anchor::CriticalCss, Anchor::Header),
            AsyncPosition::Footer => (Anchor::Footer, Anchor::Footer),
        };
        let mut noscript = String::new();
        for link in fallbacks {
            if link.rel_preload {
                ctx.injections.add(preload_anchor, link.preload_tag());
            }
            if link.noscript {
                noscript.push_str(&link.stylesheet_tag());
            }
        }
        if !noscript.is_empty() {
            ctx.injections
                .add(noscript_anchor, format!("<noscript>{noscript}</noscript>"));
        }
    }
}

fn push_fallback(
    slot: &mut Slot,
    page: &AsyncSettings,
    overrides: &AsyncOverrides,
    url: &str,
    media: &str,
) {
    let rel_preload = overrides.rel_preload.unwrap_or(page.rel_preload);
    let noscript = overrides.noscript.unwrap_or(page.noscript);
    if rel_preload || noscript {
        slot.fallbacks.push(FallbackLink {
            url: url.to_string(),
            media: media.to_string(),
            rel_preload,
            noscript,
        });
    }
}
