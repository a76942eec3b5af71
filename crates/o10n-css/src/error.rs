//! Error types shared by the pipeline stages.

use crate::cache::CacheError;
use crate::minify::MinifyError;
use crate::proxy::ProxyError;

/// Errors raised while validating configuration.
///
/// None of these abort a render: the offending filter or rule is reported
/// as a notice and treated as absent.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration document is not valid JSON for the expected shape.
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// A regular expression in a filter or replace rule does not compile.
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern {
        /// The pattern as written in the configuration.
        pattern: String,
        /// Compiler message.
        message: String,
    },
    /// A filter entry or rule has an unusable shape.
    #[error("malformed filter entry: {0}")]
    MalformedEntry(String),
}

/// Why a single stylesheet (or concat group) was left out of a stage.
///
/// A skip never fails the render; the item keeps its previous form.
#[derive(Debug, thiserror::Error)]
pub enum Skip {
    /// The source could not be downloaded or its copy stored.
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    /// The URL is neither local nor fetchable over HTTP.
    #[error("unsupported protocol: {0}")]
    InvalidProtocol(String),
    /// A local source could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Local path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The source is empty after trimming.
    #[error("empty stylesheet: {0}")]
    EmptySource(String),
    /// The minifier rejected the source.
    #[error(transparent)]
    Minify(#[from] MinifyError),
    /// The artifact could not be written.
    #[error(transparent)]
    Cache(#[from] CacheError),
}
