//! HTTP fetch utilities for remote stylesheets.
//!
//! Provides the [`Fetch`] seam used by the cache proxy and a blocking
//! reqwest implementation, [`HttpFetcher`].

use std::time::Duration;

use crate::hash::{content_hash, hash_parts};

/// User-Agent header sent with all requests.
const USER_AGENT: &str = concat!("o10n-css/", env!("CARGO_PKG_VERSION"));

/// Default request timeout.
const TIMEOUT: Duration = Duration::from_secs(30);

/// Errors produced while downloading a remote resource.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Client(String),
    /// Only `http:` and `https:` URLs can be fetched.
    #[error("unsupported URL scheme: {0}")]
    Protocol(String),
    /// The request could not be sent or timed out.
    #[error("request to {url} failed: {message}")]
    Request {
        /// Requested URL.
        url: String,
        /// Transport error message.
        message: String,
    },
    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// The response body could not be decoded as text.
    #[error("failed to read response body from {url}: {message}")]
    Body {
        /// Requested URL.
        url: String,
        /// Decoding error message.
        message: String,
    },
}

/// A downloaded text resource plus the validators the server sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    /// Response body.
    pub body: String,
    /// `ETag` response header, if any.
    pub etag: Option<String>,
    /// `Last-Modified` response header, if any.
    pub last_modified: Option<String>,
}

impl FetchedResource {
    /// Create a resource with no validators.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            etag: None,
            last_modified: None,
        }
    }

    /// Fingerprint used for cache staleness checks.
    ///
    /// Derived from the HTTP validators when the server sent any, otherwise
    /// from the body itself.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        match (&self.etag, &self.last_modified) {
            (None, None) => content_hash(&self.body),
            (etag, modified) => hash_parts([
                etag.as_deref().unwrap_or_default(),
                modified.as_deref().unwrap_or_default(),
            ]),
        }
    }
}

/// Something that can download a URL as text.
pub trait Fetch {
    /// Download `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the URL cannot be retrieved.
    fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError>;
}

impl<T: Fetch + ?Sized> Fetch for &T {
    fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError> {
        (**self).fetch(url)
    }
}

/// Blocking HTTP fetcher backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(TIMEOUT)
    }

    /// Create a fetcher with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the TLS backend cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::Protocol(url.to_string()));
        }

        tracing::debug!(url, "fetching remote resource");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let etag = header(reqwest::header::ETAG);
        let last_modified = header(reqwest::header::LAST_MODIFIED);

        let body = response.text().map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(FetchedResource {
            body,
            etag,
            last_modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_prefers_validators() {
        let plain = FetchedResource::new("a{}");
        assert_eq!(plain.fingerprint(), content_hash("a{}"));

        let mut tagged = FetchedResource::new("a{}");
        tagged.etag = Some("\"v1\"".to_string());
        let first = tagged.fingerprint();
        tagged.body = "b{}".to_string();
        assert_eq!(first, tagged.fingerprint());
        tagged.etag = Some("\"v2\"".to_string());
        assert_ne!(first, tagged.fingerprint());
    }

    #[test]
    fn test_http_fetcher_rejects_non_http_scheme() {
        let fetcher = HttpFetcher::new().unwrap();
        assert!(matches!(
            fetcher.fetch("ftp://example.com/a.css"),
            Err(FetchError::Protocol(_))
        ));
    }
}
