//! Local proxying of remote stylesheets.
//!
//! A proxied stylesheet is a verbatim copy of a remote file stored in the
//! `proxy` cache, so it can be served from the site's own origin. The copy's
//! sidecar keeps the remote fingerprint, which the minify dispatcher uses to
//! decide whether a minified artifact is still fresh.

use o10n_common::{Fetch, FetchError, content_hash};

use crate::cache::{ArtifactMeta, CacheError, CacheKind, CacheStore};

/// Size and fingerprint of a remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Body size in bytes.
    pub size: u64,
    /// Content fingerprint (validators or body hash).
    pub fingerprint: String,
}

/// A remote URL made available locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxiedFile {
    /// Proxy cache hash.
    pub hash: String,
    /// Local URL of the copy.
    pub url: String,
}

/// Errors from the proxy service.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The remote file could not be downloaded.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The local copy could not be stored.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Remote file access used by the pipeline.
pub trait Proxy {
    /// Make `url` available locally, downloading it only when no local
    /// copy exists yet.
    ///
    /// # Errors
    ///
    /// Returns a [`ProxyError`] when the file cannot be fetched or stored.
    fn proxify(&self, domain: &str, url: &str) -> Result<ProxiedFile, ProxyError>;

    /// Download `url` and return its body and metadata.
    ///
    /// # Errors
    ///
    /// Returns a [`ProxyError`] when the file cannot be fetched.
    fn filedata(&self, domain: &str, url: &str) -> Result<(String, FileMeta), ProxyError>;

    /// Metadata of the last download of `url`, without network access.
    fn meta(&self, domain: &str, url: &str) -> Option<FileMeta>;
}

/// [`Proxy`] storing copies in a [`CacheStore`].
pub struct CacheProxy<'a, F> {
    cache: &'a dyn CacheStore,
    fetcher: F,
}

impl<'a, F: Fetch> CacheProxy<'a, F> {
    /// Create a proxy over `cache`, downloading with `fetcher`.
    pub fn new(cache: &'a dyn CacheStore, fetcher: F) -> Self {
        Self { cache, fetcher }
    }

    /// Proxy cache hash of a URL.
    #[must_use]
    pub fn hash(url: &str) -> String {
        content_hash(url)
    }

    fn download(&self, domain: &str, url: &str) -> Result<(String, FileMeta, String), ProxyError> {
        let resource = self.fetcher.fetch(url)?;
        let fingerprint = resource.fingerprint();
        let hash = Self::hash(url);
        let _ = self.cache.put(
            domain,
            CacheKind::Proxy,
            &hash,
            &resource.body,
            &ArtifactMeta::fingerprint(&fingerprint),
        )?;
        let meta = FileMeta {
            size: resource.body.len() as u64,
            fingerprint,
        };
        Ok((resource.body, meta, hash))
    }
}

impl<F: Fetch> Proxy for CacheProxy<'_, F> {
    fn proxify(&self, domain: &str, url: &str) -> Result<ProxiedFile, ProxyError> {
        let hash = Self::hash(url);
        if !self.cache.exists(domain, CacheKind::Proxy, &hash) {
            tracing::debug!(url, "proxying remote stylesheet");
            let _ = self.download(domain, url)?;
        }
        Ok(ProxiedFile {
            url: self.cache.url(domain, CacheKind::Proxy, &hash),
            hash,
        })
    }

    fn filedata(&self, domain: &str, url: &str) -> Result<(String, FileMeta), ProxyError> {
        let (body, meta, _) = self.download(domain, url)?;
        Ok((body, meta))
    }

    fn meta(&self, domain: &str, url: &str) -> Option<FileMeta> {
        let meta = self.cache.meta(domain, CacheKind::Proxy, &Self::hash(url))?;
        Some(FileMeta {
            size: meta.size.unwrap_or_default(),
            fingerprint: meta.fingerprint?,
        })
    }
}
