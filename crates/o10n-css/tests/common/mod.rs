//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use o10n_common::{Fetch, FetchError, FetchedResource};
use o10n_css::cache::{ArtifactMeta, CacheError, CacheKind, CacheStore, FileCache};
use o10n_css::{Minifier, MinifyError, ServerPush, SourceCss};

/// [`FileCache`] counting writes.
pub struct CountingCache {
    pub inner: FileCache,
    pub puts: Cell<usize>,
}

impl CountingCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: FileCache::new(root, "https://example.com/cache"),
            puts: Cell::new(0),
        }
    }
}

impl CacheStore for CountingCache {
    fn exists(&self, domain: &str, kind: CacheKind, hash: &str) -> bool {
        self.inner.exists(domain, kind, hash)
    }

    fn get(&self, domain: &str, kind: CacheKind, hash: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(domain, kind, hash)
    }

    fn put(
        &self,
        domain: &str,
        kind: CacheKind,
        hash: &str,
        contents: &str,
        meta: &ArtifactMeta,
    ) -> Result<PathBuf, CacheError> {
        self.puts.set(self.puts.get() + 1);
        self.inner.put(domain, kind, hash, contents, meta)
    }

    fn preserve(
        &self,
        domain: &str,
        kind: CacheKind,
        hash: &str,
        older_than: SystemTime,
    ) -> Result<(), CacheError> {
        self.inner.preserve(domain, kind, hash, older_than)
    }

    fn meta(&self, domain: &str, kind: CacheKind, hash: &str) -> Option<ArtifactMeta> {
        self.inner.meta(domain, kind, hash)
    }

    fn url(&self, domain: &str, kind: CacheKind, hash: &str) -> String {
        self.inner.url(domain, kind, hash)
    }
}

/// Minifier collapsing whitespace, counting calls.
#[derive(Default)]
pub struct TestMinifier {
    pub calls: Cell<usize>,
    pub fail: bool,
}

impl TestMinifier {
    pub fn failing() -> Self {
        Self {
            calls: Cell::new(0),
            fail: true,
        }
    }
}

impl Minifier for TestMinifier {
    fn name(&self) -> &str {
        "test"
    }

    fn fingerprint(&self) -> String {
        "test-minifier-1".to_string()
    }

    fn minify(&self, sources: &[SourceCss]) -> Result<String, MinifyError> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(MinifyError::Minify("forced failure".to_string()));
        }
        Ok(sources
            .iter()
            .map(|source| {
                let css = source.css.split_whitespace().collect::<Vec<_>>().join(" ");
                match source.media.as_deref() {
                    Some(media) if media != "all" => format!("@media {media}{{{css}}}"),
                    _ => css,
                }
            })
            .collect::<Vec<_>>()
            .join(""))
    }
}

/// Fetcher serving fixed bodies, counting requests.
#[derive(Default)]
pub struct StaticFetch {
    pub bodies: RefCell<HashMap<String, String>>,
    pub calls: Cell<usize>,
}

impl StaticFetch {
    pub fn with(url: &str, body: &str) -> Self {
        let fetch = Self::default();
        fetch.set(url, body);
        fetch
    }

    pub fn set(&self, url: &str, body: &str) {
        let _ = self
            .bodies
            .borrow_mut()
            .insert(url.to_string(), body.to_string());
    }
}

impl Fetch for StaticFetch {
    fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError> {
        self.calls.set(self.calls.get() + 1);
        self.bodies
            .borrow()
            .get(url)
            .map(FetchedResource::new)
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Server push recording pushed URLs.
#[derive(Default)]
pub struct RecordingPush {
    pub pushed: RefCell<Vec<String>>,
}

impl ServerPush for RecordingPush {
    fn push(&self, url: &str, kind: &str) -> bool {
        assert_eq!(kind, "style");
        self.pushed.borrow_mut().push(url.to_string());
        true
    }
}
