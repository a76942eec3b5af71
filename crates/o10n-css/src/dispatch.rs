//! Minify dispatcher: one cached `src` artifact per stylesheet.
//!
//! The artifact key covers the href and every option that changes the
//! output bytes. Freshness is decided separately by comparing the source
//! fingerprint stored next to the artifact with the current one, so a
//! changed file is rebuilt under the same key.

use std::fmt::Write as _;
use std::fs;

use o10n_common::url::{filename, remove_host, resolve_url, valid_protocol};
use o10n_common::{content_hash, hash_parts};

use crate::cache::{ArtifactMeta, CacheKind, DOMAIN, preserve_threshold};
use crate::context::RenderContext;
use crate::error::Skip;
use crate::minify::SourceCss;
use crate::pipeline::CssOptimizer;
use crate::record::{MinifiedSheet, StylesheetRecord};
use crate::transform::{fix_root_paths, strip_source_maps};

/// Raw source of a sheet and its fingerprint.
struct Source {
    css: Option<String>,
    fingerprint: Option<String>,
}

impl CssOptimizer<'_> {
    /// Minify every eligible link record.
    ///
    /// Failures leave the record unminified. Sheets whose source turns out
    /// to be empty are removed from the page and dropped from `records`.
    pub fn minify_stylesheets(&self, records: &mut Vec<StylesheetRecord>, ctx: &mut RenderContext) {
        if self.settings().minify.is_none() {
            return;
        }
        records.retain_mut(|record| {
            if !record.minify || record.is_inline() {
                return true;
            }
            let Some(href) = record.href().map(str::to_string) else {
                return true;
            };
            match self.minify_sheet(&href) {
                Ok(minified) => {
                    record.minified = Some(minified);
                    true
                }
                Err(Skip::EmptySource(_)) => {
                    tracing::debug!(%href, "removing empty stylesheet");
                    ctx.rewriter.add_search_replace(record.tag.clone(), "");
                    false
                }
                Err(skip) => {
                    tracing::warn!(%href, %skip, "stylesheet not minified");
                    true
                }
            }
        });
    }

    /// Cache key of the `src` artifact for `href`.
    #[must_use]
    pub fn minify_hash(&self, href: &str) -> String {
        let rebase = self.settings().minify.as_ref().is_some_and(|m| m.rebase);
        let minifier = self.services().minifier.fingerprint();
        hash_parts([
            href,
            minifier.as_str(),
            self.settings().replace.fingerprint(),
            if rebase { "rebase" } else { "" },
        ])
    }

    /// Produce (or reuse) the minified artifact of the sheet at `href`.
    ///
    /// # Errors
    ///
    /// Returns the [`Skip`] reason when the sheet cannot be minified.
    /// [`Skip::EmptySource`] means the sheet should be removed.
    pub fn minify_sheet(&self, href: &str) -> Result<MinifiedSheet, Skip> {
        let cache = self.services().cache;
        let key = self.minify_hash(href);

        // STEP 1: Current fingerprint, reading local files right away.
        let local = self.site().local_path(href);
        let mut source = match &local {
            Some(path) => {
                let bytes = fs::read(path).map_err(|source| Skip::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Source {
                    fingerprint: Some(content_hash(&bytes)),
                    css: Some(String::from_utf8_lossy(&bytes).into_owned()),
                }
            }
            None if valid_protocol(href) => Source {
                css: None,
                fingerprint: self
                    .services()
                    .proxy
                    .meta(DOMAIN, href)
                    .map(|meta| meta.fingerprint),
            },
            None => return Err(Skip::InvalidProtocol(href.to_string())),
        };

        // STEP 2: Fresh artifact?
        if let Some(hit) = self.cached_sheet(&key, source.fingerprint.as_deref()) {
            return hit;
        }

        // STEP 3: Remote sources without a known fingerprint are downloaded.
        if source.css.is_none() {
            let (body, meta) = self.services().proxy.filedata(DOMAIN, href)?;
            source = Source {
                css: Some(body),
                fingerprint: Some(meta.fingerprint),
            };
            if let Some(hit) = self.cached_sheet(&key, source.fingerprint.as_deref()) {
                return hit;
            }
        }

        let fingerprint = source.fingerprint.unwrap_or_default();
        let css = source.css.unwrap_or_default();

        // STEP 4: Empty sources are remembered so later renders skip the work.
        if css.trim().is_empty() {
            let _ = cache.put(
                DOMAIN,
                CacheKind::Src,
                &key,
                "",
                &ArtifactMeta::fingerprint(&fingerprint),
            )?;
            return Err(Skip::EmptySource(href.to_string()));
        }

        // STEP 5: Minify and store.
        let css = self.settings().replace.apply(&strip_source_maps(&css));
        let rebase = self.settings().minify.as_ref().is_some_and(|m| m.rebase);
        let source = SourceCss {
            name: filename(href).to_string(),
            css,
            media: None,
            base_url: rebase.then(|| self.rebase_base(href)),
        };
        let minified = self.services().minifier.minify(std::slice::from_ref(&source))?;
        let mut css = fix_root_paths(&minified, &self.site().root_path());
        let _ = write!(css, "\n/* @src {} */", source.name);

        let _ = cache.put(
            DOMAIN,
            CacheKind::Src,
            &key,
            &css,
            &ArtifactMeta::fingerprint(&fingerprint),
        )?;
        tracing::debug!(href, %key, "minified stylesheet");
        Ok(MinifiedSheet { key, fingerprint })
    }

    /// Reuse a stored artifact when its fingerprint matches.
    fn cached_sheet(&self, key: &str, fingerprint: Option<&str>) -> Option<Result<MinifiedSheet, Skip>> {
        let cache = self.services().cache;
        let fingerprint = fingerprint?;
        if !cache.exists(DOMAIN, CacheKind::Src, key) {
            return None;
        }
        let meta = cache.meta(DOMAIN, CacheKind::Src, key)?;
        if meta.fingerprint.as_deref() != Some(fingerprint) {
            tracing::debug!(key, "stale minified stylesheet");
            return None;
        }
        if let Err(err) = cache.preserve(DOMAIN, CacheKind::Src, key, preserve_threshold()) {
            tracing::warn!(key, %err, "failed to refresh artifact timestamp");
        }
        if meta.size == Some(0) {
            return Some(Err(Skip::EmptySource(key.to_string())));
        }
        Some(Ok(MinifiedSheet {
            key: key.to_string(),
            fingerprint: fingerprint.to_string(),
        }))
    }

    /// URL relative references in `href` resolve against: root-relative
    /// for this site, absolute for foreign hosts.
    fn rebase_base(&self, href: &str) -> String {
        if self.site().is_same_host(href) {
            remove_host(&resolve_url(href, Some(&format!("{}/", self.site().url()))))
        } else {
            href.to_string()
        }
    }
}
