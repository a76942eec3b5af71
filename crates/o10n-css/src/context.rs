//! Collaborators and per-render state.

use o10n_common::Notices;
use o10n_html::{Anchor, Injections, OutputRewriter};

use crate::cache::CacheStore;
use crate::client::ClientConfig;
use crate::hooks::StylesheetHook;
use crate::minify::Minifier;
use crate::proxy::Proxy;

/// HTTP/2 server push.
pub trait ServerPush {
    /// Push `url` as a resource of type `kind` (`"style"`). Returns false
    /// when the push was not accepted.
    fn push(&self, url: &str, kind: &str) -> bool;
}

/// External services used by the pipeline.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    /// Artifact store.
    pub cache: &'a dyn CacheStore,
    /// Remote file access.
    pub proxy: &'a dyn Proxy,
    /// CSS minifier.
    pub minifier: &'a dyn Minifier,
    /// Server push, when the server supports it.
    pub push: Option<&'a dyn ServerPush>,
}

/// Mutable state of one page render.
///
/// Stages never edit the page directly: they register replacements,
/// injections, loader configuration and notices here, and
/// [`RenderContext::finish`] applies everything at once.
#[derive(Default)]
pub struct RenderContext {
    /// Tag replacements.
    pub rewriter: OutputRewriter,
    /// Anchored markup.
    pub injections: Injections,
    /// Operator notices.
    pub notices: Notices,
    /// Loader configuration.
    pub client: ClientConfig,
    /// Extraction hooks.
    pub hooks: Vec<Box<dyn StylesheetHook>>,
}

impl RenderContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extraction hook.
    pub fn add_hook(&mut self, hook: impl StylesheetHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Apply replacements, then the loader configuration and injections.
    #[must_use]
    pub fn finish(&self, html: &str) -> String {
        let html = self.rewriter.apply(html);
        let mut injections = self.injections.clone();
        if let Some(script) = self.client.script() {
            injections.add(Anchor::Client, script);
        }
        injections.apply(&html)
    }
}
