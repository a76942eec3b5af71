//! Stylesheet delivery optimizer.
//!
//! # Pipeline
//!
//! A page render runs these stages (see [`CssOptimizer::process_html`]):
//! - **Extraction** - `<link>` and `<style>` tags become
//!   [`StylesheetRecord`]s after URL rules, hooks and filters
//! - **Minification** - one content-addressed `src` artifact per sheet,
//!   rebuilt when the source fingerprint changes
//! - **Concatenation** - minified and inline sheets merged per group
//! - **Async loading** - deferred sheets encoded for the client loader
//!
//! Collaborators (artifact cache, remote proxy, minifier, server push) are
//! traits bundled in [`Services`]; per-render state lives in a
//! [`RenderContext`].

pub mod cache;
pub mod client;
pub mod concat;
pub mod config;
pub mod context;
mod dispatch;
pub mod encoder;
pub mod error;
mod extract;
pub mod filter;
pub mod hooks;
pub mod minify;
pub mod pipeline;
pub mod proxy;
pub mod record;
pub mod timing;
pub mod transform;

pub use cache::{ArtifactMeta, CacheError, CacheKind, CacheStore, FileCache};
pub use client::ClientConfig;
pub use concat::{ConcatGroup, ConcatMember, Grouper};
pub use config::{RawConfig, Settings};
pub use context::{RenderContext, ServerPush, Services};
pub use encoder::{AsyncEntry, EncodedList, EntryKind, NULL_SENTINEL, encode_entry, encode_list};
pub use error::{ConfigError, Skip};
pub use filter::{ConfigFilter, FilterDecision, FilterMode, ListFilter};
pub use hooks::{HookAction, StylesheetHook};
pub use minify::{LightningMinifier, Minifier, MinifyError, MinifyLevel, SourceCss};
pub use pipeline::{CssOptimizer, FallbackLink, RenderReport};
pub use proxy::{CacheProxy, FileMeta, ProxiedFile, Proxy, ProxyError};
pub use record::{MinifiedSheet, SheetSource, StylesheetRecord};
pub use timing::{ClientKey, TimingConfig, TimingType};
