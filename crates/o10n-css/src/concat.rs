//! Concatenation grouper.
//!
//! Minified link sheets and inline blocks are partitioned into groups. A
//! group's cache key is derived from its members' hashes (plus an explicit
//! group key), never from the concatenated bytes, so identical membership
//! always maps to the same artifact.

use indexmap::IndexMap;
use o10n_common::url::filename;
use o10n_common::{Notices, content_hash, hash_parts};
use serde_json::{Map, Value};

use crate::cache::{ArtifactMeta, CacheKind, DOMAIN, preserve_threshold};
use crate::config::{AsyncOverrides, AsyncSettings, ConcatSettings};
use crate::error::Skip;
use crate::filter::{FilterDecision, FilterMode, FilterRule};
use crate::minify::SourceCss;
use crate::pipeline::CssOptimizer;
use crate::record::{SheetSource, StylesheetRecord};
use crate::transform::{fix_root_paths, strip_source_maps};

/// Group used when no concat rule applies.
pub const GLOBAL_GROUP: &str = "global";

/// Where a member's CSS is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberSource {
    /// Inline `<style>` text.
    Inline {
        /// CSS text.
        css: String,
    },
    /// A `src` artifact.
    Cached {
        /// Href of the original sheet.
        href: String,
        /// `src` cache hash.
        key: String,
    },
}

/// One sheet inside a [`ConcatGroup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatMember {
    /// Member hash feeding the group key.
    pub hash: String,
    /// Media query of the sheet.
    pub media: String,
    /// Wrap the CSS in an `@media` block.
    pub merge_media: bool,
    /// CSS source.
    pub source: MemberSource,
    /// Original tag.
    pub tag: String,
    /// Document position of the sheet.
    pub position: usize,
}

impl ConcatMember {
    /// Display name: the href for links, `inline-<hash>` for blocks.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.source {
            MemberSource::Inline { .. } => format!("inline-{}", self.hash),
            MemberSource::Cached { href, .. } => href.clone(),
        }
    }
}

/// A set of sheets delivered as one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatGroup {
    /// Group key (rule hash, explicit key or [`GLOBAL_GROUP`], with an
    /// `@media` suffix for segregated media queries).
    pub key: String,
    /// Explicit `group.key` of the matched rule.
    pub explicit_key: Option<String>,
    /// Title emitted in the artifact footer.
    pub title: Option<String>,
    /// Per-group minify switch.
    pub minify: Option<bool>,
    /// Media query of the emitted link.
    pub media: Option<String>,
    /// Load the artifact asynchronously.
    pub is_async: bool,
    /// Async options differing from the page defaults.
    pub overrides: AsyncOverrides,
    /// Members in document order.
    pub members: Vec<ConcatMember>,
}

impl ConcatGroup {
    fn new(key: String) -> Self {
        Self {
            key,
            explicit_key: None,
            title: None,
            minify: None,
            media: None,
            is_async: true,
            overrides: AsyncOverrides::default(),
            members: Vec::new(),
        }
    }

    /// Membership hash: the explicit key (if any) followed by the member
    /// hashes.
    #[must_use]
    pub fn hash(&self) -> String {
        hash_parts(
            self.explicit_key
                .iter()
                .map(String::as_str)
                .chain(self.members.iter().map(|m| m.hash.as_str())),
        )
    }

    /// Artifact key: the membership hash combined with the fingerprint of
    /// every option that changes the artifact bytes.
    #[must_use]
    pub fn artifact_key(&self, options: &str) -> String {
        hash_parts([self.hash().as_str(), options])
    }

    /// Position of the last member, where the group is emitted.
    #[must_use]
    pub fn last_position(&self) -> usize {
        self.members.iter().map(|m| m.position).max().unwrap_or_default()
    }

    /// The member emitted last in the document.
    #[must_use]
    pub fn last_member(&self) -> Option<&ConcatMember> {
        self.members.iter().max_by_key(|m| m.position)
    }

    /// Member labels, for debug references.
    #[must_use]
    pub fn original_urls(&self) -> Vec<String> {
        self.members.iter().map(ConcatMember::label).collect()
    }

    /// Artifact footer: `/* [title] @concat [key] [@min name] */`.
    #[must_use]
    pub fn footer(&self, minifier: Option<&str>) -> String {
        let mut footer = String::from("\n/* ");
        if let Some(title) = &self.title {
            footer.push_str(title);
            footer.push_str("\n ");
        }
        footer.push_str("@concat");
        if let Some(key) = &self.explicit_key {
            footer.push(' ');
            footer.push_str(key);
        }
        if let Some(name) = minifier {
            footer.push_str(" @min ");
            footer.push_str(name);
        }
        footer.push_str(" */");
        footer
    }

    /// Take rule settings the group does not have yet.
    fn absorb(&mut self, options: &Map<String, Value>) {
        if self.title.is_none() {
            self.title = options
                .get("title")
                .and_then(Value::as_str)
                .filter(|t| !t.trim().is_empty())
                .map(str::to_string);
        }
        if self.minify.is_none() {
            self.minify = options.get("minify").and_then(Value::as_bool);
        }
    }
}

/// Fill the unset fields of `target` from `other`.
fn fill_overrides(target: &mut AsyncOverrides, other: AsyncOverrides) {
    let AsyncOverrides {
        load_position,
        load_timing,
        render_timing,
        request_animation_frame,
        rel_preload,
        noscript,
        media,
        local_storage,
    } = other;
    target.load_position = target.load_position.or(load_position);
    target.load_timing = target.load_timing.take().or(load_timing);
    target.render_timing = target.render_timing.take().or(render_timing);
    target.request_animation_frame = target.request_animation_frame.or(request_animation_frame);
    target.rel_preload = target.rel_preload.or(rel_preload);
    target.noscript = target.noscript.or(noscript);
    target.media = target.media.take().or(media);
    target.local_storage = target.local_storage.take().or(local_storage);
}

/// Assigns sheets to concat groups for one render.
pub struct Grouper<'s> {
    settings: &'s ConcatSettings,
    page: Option<&'s AsyncSettings>,
    groups: IndexMap<String, ConcatGroup>,
}

impl<'s> Grouper<'s> {
    /// Create a grouper; `page` is `None` when async loading is disabled.
    #[must_use]
    pub fn new(settings: &'s ConcatSettings, page: Option<&'s AsyncSettings>) -> Self {
        Self {
            settings,
            page,
            groups: IndexMap::new(),
        }
    }

    /// Add `record` to its group. Returns false when the sheet is not
    /// concatenated and must be handled on its own.
    pub fn assign(&mut self, record: &StylesheetRecord, position: usize, notices: &mut Notices) -> bool {
        // STEP 1: Eligibility.
        let (source, hash) = match (&record.source, &record.minified) {
            (SheetSource::Inline { css, .. }, _) => {
                (MemberSource::Inline { css: css.clone() }, content_hash(css))
            }
            (SheetSource::Link { href }, Some(minified)) => (
                MemberSource::Cached {
                    href: href.clone(),
                    key: minified.key.clone(),
                },
                minified.member_hash(),
            ),
            (SheetSource::Link { .. }, None) => return false,
        };

        // STEP 2: Group rule.
        let rule: Option<&FilterRule> = match &self.settings.filter {
            None => None,
            Some(filter) => match filter.evaluate(&record.tag) {
                FilterDecision::Rejected => return false,
                FilterDecision::Unmatched if filter.mode() == FilterMode::Exclude => return false,
                FilterDecision::Unmatched => None,
                FilterDecision::Matched(rule) => Some(rule),
            },
        };
        let mut key = rule.map_or_else(|| GLOBAL_GROUP.to_string(), |r| r.key().to_string());

        // STEP 3: Media queries merge into the group or split it.
        let has_media = !record.media.is_empty() && record.media != "all";
        let merge_media = match &self.settings.media_queries {
            Some(filter) if has_media => filter.as_ref().is_none_or(|f| f.matches(&record.tag)),
            _ => false,
        };
        let segregated = has_media && !merge_media;
        if segregated {
            key = format!("{key}@media{}", record.media);
        }

        // STEP 4: Create the group on first use.
        if !self.groups.contains_key(&key) {
            let media = segregated.then_some(record.media.as_str());
            let group = self.create_group(key.clone(), rule, media, notices);
            let _ = self.groups.insert(key.clone(), group);
        }
        let Some(group) = self.groups.get_mut(&key) else {
            return false;
        };
        if let Some(rule) = rule {
            group.absorb(rule.options());
        }
        group.members.push(ConcatMember {
            hash,
            media: record.media.clone(),
            merge_media,
            source,
            tag: record.tag.clone(),
            position,
        });
        true
    }

    fn create_group(
        &self,
        key: String,
        rule: Option<&FilterRule>,
        media: Option<&str>,
        notices: &mut Notices,
    ) -> ConcatGroup {
        let mut group = ConcatGroup::new(key);
        group.explicit_key = rule.and_then(FilterRule::explicit_key).map(str::to_string);
        group.media = rule
            .and_then(|r| r.options().get("media"))
            .and_then(Value::as_str)
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .or_else(|| media.map(str::to_string));

        let Some(page) = self.page else {
            group.is_async = false;
            return group;
        };

        // rule options first, then the async rules matched on the group key
        if let Some(rule) = rule {
            let (is_async, overrides) = AsyncOverrides::from_rule(rule.options(), page, notices);
            group.is_async = is_async;
            group.overrides = overrides;
        }
        if let Some(filter) = &page.concat_filter {
            match filter.evaluate(&group.key) {
                FilterDecision::Rejected => group.is_async = false,
                FilterDecision::Unmatched => {}
                FilterDecision::Matched(async_rule) => {
                    let (is_async, overrides) =
                        AsyncOverrides::from_rule(async_rule.options(), page, notices);
                    group.is_async &= is_async;
                    fill_overrides(&mut group.overrides, overrides);
                }
            }
        }
        if let Some(media) = &group.overrides.media {
            group.media = Some(media.clone());
        }
        group
    }

    /// Groups in creation order.
    #[must_use]
    pub fn into_groups(self) -> Vec<ConcatGroup> {
        self.groups.into_values().collect()
    }
}

impl CssOptimizer<'_> {
    /// Make sure the artifact of `group` exists and return its hash.
    ///
    /// # Errors
    ///
    /// Returns a [`Skip`] when a member cannot be read or the artifact
    /// cannot be stored. Minifier failures fall back to plain joining.
    pub fn build_group(&self, group: &ConcatGroup) -> Result<String, Skip> {
        let cache = self.services().cache;
        let minifier = self.services().minifier;
        let minify = group
            .minify
            .unwrap_or_else(|| self.settings().concat.as_ref().is_some_and(|c| c.minify));
        let hash = group.artifact_key(&self.group_options(group, minify));

        if cache.exists(DOMAIN, CacheKind::Concat, &hash) {
            if let Err(err) = cache.preserve(DOMAIN, CacheKind::Concat, &hash, preserve_threshold()) {
                tracing::warn!(%hash, %err, "failed to refresh artifact timestamp");
            }
            return Ok(hash);
        }

        // STEP 1: Collect member sources.
        let mut sources = Vec::with_capacity(group.members.len());
        for member in &group.members {
            let (name, css) = match &member.source {
                MemberSource::Inline { css } => (
                    member.label(),
                    self.settings().replace.apply(css),
                ),
                MemberSource::Cached { href, key } => {
                    let Some(css) = cache.get(DOMAIN, CacheKind::Src, key)? else {
                        continue;
                    };
                    (filename(href).to_string(), css)
                }
            };
            if css.trim().is_empty() {
                continue;
            }
            sources.push(SourceCss {
                name,
                css: strip_source_maps(&css),
                media: member.merge_media.then(|| member.media.clone()),
                base_url: None,
            });
        }

        // STEP 2: Minify, or join when minification is off or fails.
        let minified = if minify {
            match minifier.minify(&sources) {
                Ok(css) => Some(fix_root_paths(&css, &self.site().root_path())),
                Err(err) => {
                    tracing::warn!(group = %group.key, %err, "concat minification failed, joining sources");
                    None
                }
            }
        } else {
            None
        };
        let css = match minified {
            Some(css) => css + &group.footer(Some(minifier.name())),
            None => join_sources(&sources) + &group.footer(None),
        };

        // STEP 3: Store.
        let _ = cache.put(
            DOMAIN,
            CacheKind::Concat,
            &hash,
            &css,
            &ArtifactMeta::group(group.explicit_key.as_deref()),
        )?;
        tracing::debug!(group = %group.key, %hash, members = group.members.len(), "stored concat group");
        Ok(hash)
    }

    /// Fingerprint of the options shaping a group artifact: minification
    /// and minifier, footer title, merged media per member and the CSS
    /// replacements applied to inline members.
    fn group_options(&self, group: &ConcatGroup, minify: bool) -> String {
        let minifier = if minify {
            self.services().minifier.fingerprint()
        } else {
            String::new()
        };
        let media: String = group
            .members
            .iter()
            .map(|m| if m.merge_media { '1' } else { '0' })
            .collect();
        let has_inline = group
            .members
            .iter()
            .any(|m| matches!(m.source, MemberSource::Inline { .. }));
        let replace = if has_inline {
            self.settings().replace.fingerprint()
        } else {
            ""
        };
        hash_parts([
            if minify { "min" } else { "plain" },
            minifier.as_str(),
            group.title.as_deref().unwrap_or_default(),
            media.as_str(),
            replace,
        ])
    }
}

fn join_sources(sources: &[SourceCss]) -> String {
    sources
        .iter()
        .map(|source| match source.media.as_deref() {
            Some(media) if media != "all" => format!("@media {media}{{{}}}", source.css),
            _ => source.css.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
