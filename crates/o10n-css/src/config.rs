//! Configuration: the raw JSON option tree and its validated form.
//!
//! [`RawConfig`] mirrors the option tree as stored (every section has an
//! `enabled` flag; filters carry a `type` and the lists for each type).
//! [`Settings::load`] compiles it into [`Settings`], where a disabled
//! feature is simply `None` and every filter is ready to evaluate.

use o10n_common::{CdnRewrite, Notices};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::filter::{ConfigFilter, FilterMode, ListFilter, Pattern};
use crate::minify::MinifyLevel;
use crate::timing::{ClientKey, TimingConfig};
use crate::transform::{CssReplacer, ReplaceRule};

/// A list filter as configured: `{"enabled", "type", "include", "exclude"}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListFilterConfig {
    /// Apply the filter.
    pub enabled: bool,
    /// Which list is active.
    #[serde(rename = "type")]
    pub mode: FilterMode,
    /// Patterns used in include mode.
    pub include: Value,
    /// Patterns used in exclude mode.
    pub exclude: Value,
}

impl ListFilterConfig {
    fn compile(&self, notices: &mut Notices) -> Option<ListFilter> {
        if !self.enabled {
            return None;
        }
        let list = match self.mode {
            FilterMode::Include => &self.include,
            FilterMode::Exclude => &self.exclude,
        };
        if list.is_null() {
            return None;
        }
        ListFilter::from_value(self.mode, list, notices)
    }
}

/// A rule filter as configured: `{"enabled", "type", "config": [rules]}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFilterConfig {
    /// Apply the filter.
    pub enabled: bool,
    /// Default for candidates no rule matches.
    #[serde(rename = "type")]
    pub mode: FilterMode,
    /// Ordered rules.
    pub config: Value,
}

/// `minify` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MinifyConfig {
    /// Minify stylesheets.
    pub enabled: bool,
    /// Which stylesheets to minify.
    pub filter: ListFilterConfig,
    /// Rebase relative `url()` references to the source location.
    pub rebase: bool,
    /// Minifier aggressiveness.
    pub level: MinifyLevel,
    /// Concatenation.
    pub concat: ConcatConfig,
}

impl Default for MinifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filter: ListFilterConfig::default(),
            rebase: true,
            level: MinifyLevel::default(),
            concat: ConcatConfig::default(),
        }
    }
}

/// `minify.concat` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConcatConfig {
    /// Concatenate minified stylesheets.
    pub enabled: bool,
    /// Minify concatenated output.
    pub minify: bool,
    /// Grouping rules.
    pub filter: ConfigFilterConfig,
    /// Concatenate inline `<style>` blocks too.
    pub inline: InlineConcatConfig,
    /// Merge `media` attributes into `@media` blocks.
    pub mediaqueries: MediaQueriesConfig,
}

/// `minify.concat.inline` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InlineConcatConfig {
    /// Include `<style>` blocks.
    pub enabled: bool,
    /// Which blocks to include.
    pub filter: ListFilterConfig,
}

/// `minify.concat.mediaqueries` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaQueriesConfig {
    /// Merge media queries.
    pub enabled: bool,
    /// Which tags may be merged.
    pub filter: ListFilterConfig,
}

/// Where the async loader starts downloading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPosition {
    /// Immediately, from `<head>`.
    #[default]
    Header,
    /// On a [`TimingConfig`] trigger.
    Timing,
}

impl LoadPosition {
    /// Wire value: `0` for header, `1` for timing.
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::Header => 0,
            Self::Timing => 1,
        }
    }
}

/// Where loader-related markup is injected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsyncPosition {
    /// Start of the document, with critical CSS.
    #[default]
    Header,
    /// End of `<body>`.
    Footer,
}

/// `async.localStorage` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LocalStorageConfig {
    /// Cache async stylesheets in localStorage.
    pub enabled: bool,
    /// Maximum stylesheet size to cache.
    pub max_size: Option<Value>,
    /// Entry lifetime.
    pub expire: Option<Value>,
    /// Background refresh interval.
    pub update_interval: Option<Value>,
    /// Refresh on `<head>` load.
    pub head_update: bool,
}

/// Validated localStorage options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalStorageSettings {
    /// Maximum stylesheet size to cache.
    pub max_size: Option<Value>,
    /// Entry lifetime.
    pub expire: Option<Value>,
    /// Background refresh interval.
    pub update_interval: Option<Value>,
    /// Refresh on `<head>` load.
    pub head_update: bool,
}

impl LocalStorageSettings {
    fn present(value: Option<&Value>) -> Option<&Value> {
        value.filter(|v| match v {
            Value::Null | Value::Bool(false) => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Number(n) => n.as_f64() != Some(0.0),
            _ => true,
        })
    }

    /// Options keyed by client key name (`max_size`, ...), unset ones omitted.
    #[must_use]
    pub fn named_entries(&self) -> Vec<(ClientKey, Value)> {
        let mut entries = Vec::new();
        for (key, value) in [
            (ClientKey::MaxSize, self.max_size.as_ref()),
            (ClientKey::Expire, self.expire.as_ref()),
            (ClientKey::UpdateInterval, self.update_interval.as_ref()),
        ] {
            if let Some(value) = Self::present(value) {
                entries.push((key, value.clone()));
            }
        }
        if self.head_update {
            entries.push((ClientKey::HeadUpdate, Value::from(1)));
        }
        entries
    }

    /// Compressed client form: `{"<keyIndex>": value}`.
    #[must_use]
    pub fn encode(&self) -> Value {
        let map: Map<String, Value> = self
            .named_entries()
            .into_iter()
            .map(|(key, value)| (key.object_key(), value))
            .collect();
        Value::Object(map)
    }
}

/// `async` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AsyncConfig {
    /// Load stylesheets asynchronously.
    pub enabled: bool,
    /// Emit `<link rel="preload">` hints.
    pub rel_preload: bool,
    /// Emit `<noscript>` fallbacks.
    pub noscript: bool,
    /// Render stylesheets in an animation frame.
    #[serde(rename = "requestAnimationFrame")]
    pub request_animation_frame: bool,
    /// Download start.
    pub load_position: LoadPosition,
    /// Trigger for timed downloads.
    pub load_timing: Option<TimingConfig>,
    /// Trigger for rendering downloaded sheets.
    pub render_timing: Option<TimingConfig>,
    /// Where preload hints and fallbacks go.
    pub position: AsyncPosition,
    /// localStorage caching.
    #[serde(rename = "localStorage")]
    pub local_storage: LocalStorageConfig,
    /// Per-sheet async rules.
    pub filter: ConfigFilterConfig,
}

/// `proxy` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy remote stylesheets that are not minified.
    pub enabled: bool,
    /// Tags to proxy; all remote sheets when empty.
    pub include: Value,
}

/// `url_filter` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UrlFilterConfig {
    /// Apply URL rules.
    pub enabled: bool,
    /// Rules `{url, regex?, ignore?, delete?, replace?}`.
    pub config: Vec<Value>,
}

/// `replace` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReplaceConfig {
    /// Apply search & replace.
    pub enabled: bool,
    /// Rules in order.
    pub config: Vec<ReplaceRule>,
}

/// `cdn` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CdnConfig {
    /// Rewrite stylesheet URLs onto the CDN.
    pub enabled: bool,
    /// CDN base URL.
    pub url: String,
    /// Path prefix the CDN maps to its root.
    pub mask: Option<String>,
    /// Push the CDN URL instead of the local one.
    pub http2_push: bool,
}

/// `http2_push` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Push emitted stylesheet URLs.
    pub enabled: bool,
    /// Which URLs to push.
    pub filter: ListFilterConfig,
}

/// The stylesheet option tree as stored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// Minification and concatenation.
    pub minify: MinifyConfig,
    /// Async loading.
    #[serde(rename = "async")]
    pub async_load: AsyncConfig,
    /// Remote stylesheet proxy.
    pub proxy: ProxyConfig,
    /// Pre-processing URL rules.
    pub url_filter: UrlFilterConfig,
    /// CSS search & replace.
    pub replace: ReplaceConfig,
    /// CDN rewrite.
    pub cdn: CdnConfig,
    /// HTTP/2 server push.
    pub http2_push: PushConfig,
    /// Emit debug references and annotations.
    pub debug: bool,
}

impl RawConfig {
    /// Parse the option tree from JSON. Unknown sections are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed documents.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse the option tree from an already decoded document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] when sections have the wrong shape.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// What a URL rule does with a matching stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlAction {
    /// Leave the tag alone and exclude it from processing.
    Ignore,
    /// Remove the tag from the page.
    Delete,
    /// Continue with a different href.
    Replace(String),
}

/// A compiled URL rule.
#[derive(Debug, Clone)]
pub struct UrlRule {
    /// Tested against the href.
    pub pattern: Pattern,
    /// Effect on a match; `None` for a rule without action.
    pub action: Option<UrlAction>,
}

/// Validated minify settings.
#[derive(Debug, Clone)]
pub struct MinifySettings {
    /// Tag filter; every sheet is minified when `None`.
    pub filter: Option<ListFilter>,
    /// Rebase relative `url()` references.
    pub rebase: bool,
}

/// Validated concat settings.
#[derive(Debug, Clone)]
pub struct ConcatSettings {
    /// Minify concatenated output.
    pub minify: bool,
    /// Grouping rules; everything goes to `global` when `None`.
    pub filter: Option<ConfigFilter>,
    /// Inline `<style>` participation; `Some(None)` means all blocks.
    pub inline: Option<Option<ListFilter>>,
    /// Media query merging; `Some(None)` means merge every query.
    pub media_queries: Option<Option<ListFilter>>,
}

/// Validated async settings (page defaults).
#[derive(Debug, Clone, Default)]
pub struct AsyncSettings {
    /// Emit `<link rel="preload">` hints.
    pub rel_preload: bool,
    /// Emit `<noscript>` fallbacks.
    pub noscript: bool,
    /// Render in an animation frame.
    pub request_animation_frame: bool,
    /// Download start.
    pub load_position: LoadPosition,
    /// Timed download trigger (only with [`LoadPosition::Timing`]).
    pub load_timing: Option<TimingConfig>,
    /// Render trigger.
    pub render_timing: Option<TimingConfig>,
    /// Where preload hints and fallbacks go.
    pub position: AsyncPosition,
    /// localStorage caching.
    pub local_storage: Option<LocalStorageSettings>,
    /// Per-sheet rules.
    pub filter: Option<ConfigFilter>,
    /// Rules matched against concat group keys.
    pub concat_filter: Option<ConfigFilter>,
    /// Default when no rule matches.
    pub filter_mode: FilterMode,
}

/// Validated CDN settings.
#[derive(Debug, Clone)]
pub struct CdnSettings {
    /// Host rewrite.
    pub rewrite: CdnRewrite,
    /// Push the CDN URL instead of the local one.
    pub http2_push: bool,
}

/// Validated stylesheet settings for one render.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// `None` when minification is disabled.
    pub minify: Option<MinifySettings>,
    /// `None` when concatenation is disabled.
    pub concat: Option<ConcatSettings>,
    /// `None` when async loading is disabled.
    pub async_load: Option<AsyncSettings>,
    /// `None` when proxying is disabled; `Some(None)` proxies every sheet.
    pub proxy: Option<Option<ListFilter>>,
    /// URL rules in order.
    pub url_filter: Vec<UrlRule>,
    /// CSS search & replace.
    pub replace: CssReplacer,
    /// CDN rewrite.
    pub cdn: Option<CdnSettings>,
    /// `None` when push is disabled; `Some(None)` pushes every URL.
    pub http2_push: Option<Option<ListFilter>>,
    /// Debug output.
    pub debug: bool,
}

impl Settings {
    /// Validate a raw option tree.
    ///
    /// Malformed filters and rules are reported to `notices` and dropped;
    /// loading itself never fails.
    #[must_use]
    pub fn load(raw: &RawConfig, notices: &mut Notices) -> Self {
        let minify = raw.minify.enabled.then(|| MinifySettings {
            filter: raw.minify.filter.compile(notices),
            rebase: raw.minify.rebase,
        });

        let concat_raw = &raw.minify.concat;
        let concat = (raw.minify.enabled && concat_raw.enabled).then(|| ConcatSettings {
            minify: concat_raw.minify,
            filter: compile_rules(&concat_raw.filter, notices),
            inline: concat_raw
                .inline
                .enabled
                .then(|| concat_raw.inline.filter.compile(notices)),
            media_queries: concat_raw
                .mediaqueries
                .enabled
                .then(|| concat_raw.mediaqueries.filter.compile(notices)),
        });

        let async_load = raw
            .async_load
            .enabled
            .then(|| load_async(&raw.async_load, notices));

        let proxy = raw.proxy.enabled.then(|| {
            if raw.proxy.include.is_null() {
                None
            } else {
                ListFilter::from_value(FilterMode::Include, &raw.proxy.include, notices)
            }
        });

        let url_filter = if raw.url_filter.enabled {
            raw.url_filter
                .config
                .iter()
                .filter_map(|rule| url_rule(rule, notices))
                .collect()
        } else {
            Vec::new()
        };

        let replace = if raw.replace.enabled {
            CssReplacer::new(&raw.replace.config, notices)
        } else {
            CssReplacer::default()
        };

        let cdn = (raw.cdn.enabled && !raw.cdn.url.is_empty()).then(|| CdnSettings {
            rewrite: CdnRewrite {
                url: raw.cdn.url.clone(),
                mask: raw.cdn.mask.clone(),
            },
            http2_push: raw.cdn.http2_push,
        });

        let http2_push = raw
            .http2_push
            .enabled
            .then(|| raw.http2_push.filter.compile(notices));

        Self {
            minify,
            concat,
            async_load,
            proxy,
            url_filter,
            replace,
            cdn,
            http2_push,
            debug: raw.debug,
        }
    }

    /// True when any stage would touch the page.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.minify.is_some() || self.async_load.is_some() || self.proxy.is_some()
    }
}

fn compile_rules(config: &ConfigFilterConfig, notices: &mut Notices) -> Option<ConfigFilter> {
    if !config.enabled || config.config.is_null() {
        return None;
    }
    ConfigFilter::from_value(config.mode, &config.config, notices)
}

fn load_async(raw: &AsyncConfig, notices: &mut Notices) -> AsyncSettings {
    let render_timing = raw.render_timing.clone().filter(|t| t.enabled);
    let load_timing = match raw.load_position {
        LoadPosition::Timing => raw.load_timing.clone().filter(|t| t.enabled),
        LoadPosition::Header => None,
    };
    // an animation-frame render timing replaces the plain rAF flag
    let request_animation_frame = raw.request_animation_frame
        && render_timing
            .as_ref()
            .is_none_or(|t| t.kind != crate::timing::TimingType::RequestAnimationFrame);

    let local_storage = raw.local_storage.enabled.then(|| LocalStorageSettings {
        max_size: raw.local_storage.max_size.clone(),
        expire: raw.local_storage.expire.clone(),
        update_interval: raw.local_storage.update_interval.clone(),
        head_update: raw.local_storage.head_update,
    });

    let (filter, concat_filter) = if raw.filter.enabled && !raw.filter.config.is_null() {
        ConfigFilter::split_concat(raw.filter.mode, &raw.filter.config, notices)
    } else {
        (None, None)
    };

    AsyncSettings {
        rel_preload: raw.rel_preload,
        noscript: raw.noscript,
        request_animation_frame,
        load_position: raw.load_position,
        load_timing,
        render_timing,
        position: raw.position,
        local_storage,
        filter,
        concat_filter,
        filter_mode: raw.filter.mode,
    }
}

fn url_rule(value: &Value, notices: &mut Notices) -> Option<UrlRule> {
    let Some(rule) = value.as_object() else {
        notices.warn_once("url_filter", format!("malformed rule: {value}"));
        return None;
    };
    let Some(url) = rule.get("url").and_then(Value::as_str).filter(|u| !u.is_empty()) else {
        notices.warn_once("url_filter", format!("rule without url: {value}"));
        return None;
    };
    let pattern = if rule.get("regex").and_then(Value::as_bool).unwrap_or(false) {
        match Pattern::regex(url) {
            Ok(pattern) => pattern,
            Err(err) => {
                notices.warn_once("url_filter", err.to_string());
                return None;
            }
        }
    } else {
        Pattern::Substring(url.to_string())
    };
    let flag = |key: &str| rule.get(key).is_some_and(|v| !matches!(v, Value::Null | Value::Bool(false)));
    let action = if flag("ignore") {
        Some(UrlAction::Ignore)
    } else if flag("delete") {
        Some(UrlAction::Delete)
    } else {
        rule.get("replace")
            .and_then(Value::as_str)
            .map(|href| UrlAction::Replace(href.to_string()))
    };
    Some(UrlRule { pattern, action })
}

/// Per-sheet (or per-group) async options set by a filter rule.
///
/// A field is only set when it differs from the page default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsyncOverrides {
    /// Download start.
    pub load_position: Option<LoadPosition>,
    /// Timed download trigger.
    pub load_timing: Option<TimingConfig>,
    /// Render trigger.
    pub render_timing: Option<TimingConfig>,
    /// Animation-frame rendering.
    pub request_animation_frame: Option<bool>,
    /// Preload hint.
    pub rel_preload: Option<bool>,
    /// `<noscript>` fallback.
    pub noscript: Option<bool>,
    /// Media query replacing the tag's own.
    pub media: Option<String>,
    /// localStorage caching.
    pub local_storage: Option<LocalStorageOverride>,
}

/// localStorage choice of a single sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalStorageOverride {
    /// Switched on or off without options.
    Enabled(bool),
    /// Switched on with explicit options.
    Custom(LocalStorageSettings),
}

impl LocalStorageOverride {
    /// Compressed client form: `0`, `1` or a keyed option object.
    #[must_use]
    pub fn encode(&self) -> Value {
        match self {
            Self::Enabled(on) => Value::from(u8::from(*on)),
            Self::Custom(settings) => settings.encode(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOverrides {
    #[serde(rename = "async")]
    is_async: Option<bool>,
    load_position: Option<LoadPosition>,
    load_timing: Option<TimingConfig>,
    render_timing: Option<TimingConfig>,
    #[serde(rename = "requestAnimationFrame")]
    request_animation_frame: Option<bool>,
    rel_preload: Option<bool>,
    noscript: Option<bool>,
    media: Option<String>,
    #[serde(rename = "localStorage")]
    local_storage: Option<Value>,
}

impl AsyncOverrides {
    /// Read overrides from a rule's options. Returns whether the rule
    /// enables async loading (`async` defaults to true) and the overrides.
    ///
    /// Malformed options are reported and ignored.
    #[must_use]
    pub fn from_rule(
        options: &Map<String, Value>,
        page: &AsyncSettings,
        notices: &mut Notices,
    ) -> (bool, Self) {
        let raw: RawOverrides = match serde_json::from_value(Value::Object(options.clone())) {
            Ok(raw) => raw,
            Err(err) => {
                notices.warn_once("async", format!("invalid async rule options: {err}"));
                RawOverrides::default()
            }
        };
        if raw.is_async == Some(false) {
            return (false, Self::default());
        }

        let differs = |value: Option<bool>, default: bool| value.filter(|v| *v != default);
        let local_storage = raw.local_storage.and_then(|value| match value {
            Value::Bool(false) => Some(LocalStorageOverride::Enabled(false)),
            Value::Bool(true) => Some(page.local_storage.clone().map_or(
                LocalStorageOverride::Enabled(true),
                LocalStorageOverride::Custom,
            )),
            Value::Object(map) => {
                let config: LocalStorageConfig =
                    serde_json::from_value(Value::Object(map)).unwrap_or_default();
                Some(LocalStorageOverride::Custom(LocalStorageSettings {
                    max_size: config.max_size,
                    expire: config.expire,
                    update_interval: config.update_interval,
                    head_update: config.head_update,
                }))
            }
            Value::Number(n) => Some(LocalStorageOverride::Enabled(n.as_f64() != Some(0.0))),
            _ => None,
        });

        let overrides = Self {
            load_position: raw.load_position.filter(|p| *p != page.load_position),
            load_timing: raw
                .load_timing
                .filter(|t| t.enabled && Some(t) != page.load_timing.as_ref()),
            render_timing: raw
                .render_timing
                .filter(|t| t.enabled && Some(t) != page.render_timing.as_ref()),
            request_animation_frame: differs(
                raw.request_animation_frame,
                page.request_animation_frame,
            ),
            rel_preload: differs(raw.rel_preload, page.rel_preload),
            noscript: differs(raw.noscript, page.noscript),
            media: raw.media.map(|m| m.trim().to_lowercase()).filter(|m| !m.is_empty()),
            local_storage,
        };
        (true, overrides)
    }
}
