//! Content-addressed artifact cache.
//!
//! Artifacts are addressed by `(domain, kind, hash)`. [`FileCache`] stores
//! them under a sharded directory tree:
//!
//! ```text
//! <root>/<domain>/<kind>/<h0h1>/<h2h3>/<hash>.css
//! <root>/<domain>/<kind>/<h0h1>/<h2h3>/<hash>.css.meta
//! ```
//!
//! The `.meta` sidecar is JSON holding the source fingerprint used for
//! staleness checks. Writes land in a temporary file first and are then
//! renamed into place, so concurrent renders never observe partial
//! artifacts (last writer wins).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Cache domain used for stylesheet artifacts.
pub const DOMAIN: &str = "css";

/// Artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum CacheKind {
    /// A single minified stylesheet.
    Src,
    /// A concatenated group (also used for critical CSS).
    Concat,
    /// A verbatim copy of a remote stylesheet.
    Proxy,
}

/// Sidecar metadata stored next to an artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Fingerprint of the source the artifact was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Concat group key or other grouping label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_key: Option<String>,
    /// Artifact size in bytes, filled in by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Write time as unix seconds, filled in by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<u64>,
}

impl ArtifactMeta {
    /// Metadata carrying only a fingerprint.
    #[must_use]
    pub fn fingerprint(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: Some(fingerprint.into()),
            ..Self::default()
        }
    }

    /// Metadata carrying only a group key.
    #[must_use]
    pub fn group(group_key: Option<&str>) -> Self {
        Self {
            group_key: group_key.map(str::to_string),
            ..Self::default()
        }
    }
}

/// Errors from the artifact store.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem failure.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The metadata sidecar could not be encoded.
    #[error("cache metadata error at {path}: {source}")]
    Meta {
        /// Sidecar path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Content-addressed artifact storage.
pub trait CacheStore {
    /// True when the artifact exists.
    fn exists(&self, domain: &str, kind: CacheKind, hash: &str) -> bool;

    /// Read an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] when the artifact exists but cannot be read.
    fn get(&self, domain: &str, kind: CacheKind, hash: &str) -> Result<Option<String>, CacheError>;

    /// Write an artifact and its metadata, returning the artifact path.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] when the artifact or sidecar cannot be written.
    fn put(
        &self,
        domain: &str,
        kind: CacheKind,
        hash: &str,
        contents: &str,
        meta: &ArtifactMeta,
    ) -> Result<PathBuf, CacheError>;

    /// Mark an artifact as recently used if it was last touched before
    /// `older_than`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] when the timestamp cannot be updated.
    fn preserve(
        &self,
        domain: &str,
        kind: CacheKind,
        hash: &str,
        older_than: SystemTime,
    ) -> Result<(), CacheError>;

    /// Read the metadata sidecar.
    fn meta(&self, domain: &str, kind: CacheKind, hash: &str) -> Option<ArtifactMeta>;

    /// Public URL of an artifact.
    fn url(&self, domain: &str, kind: CacheKind, hash: &str) -> String;
}

/// Threshold passed to [`CacheStore::preserve`] on cache hits: artifacts
/// untouched for an hour get their timestamp bumped.
#[must_use]
pub fn preserve_threshold() -> SystemTime {
    SystemTime::now()
        .checked_sub(Duration::from_secs(3600))
        .unwrap_or(UNIX_EPOCH)
}

/// Filesystem-backed [`CacheStore`].
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
    base_url: String,
}

impl FileCache {
    /// Create a cache rooted at `root`, served publicly at `base_url`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Relative artifact path: `<domain>/<kind>/<h0h1>/<h2h3>/<hash>.css`.
    #[must_use]
    pub fn relative_path(domain: &str, kind: CacheKind, hash: &str) -> String {
        let shard = |range: std::ops::Range<usize>| hash.get(range).unwrap_or("00");
        format!("{domain}/{kind}/{}/{}/{hash}.css", shard(0..2), shard(2..4))
    }

    /// Absolute artifact path.
    #[must_use]
    pub fn artifact_path(&self, domain: &str, kind: CacheKind, hash: &str) -> PathBuf {
        self.root.join(Self::relative_path(domain, kind, hash))
    }

    fn meta_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".meta");
        PathBuf::from(name)
    }

    fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
        let io = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(io)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io)?;
        tmp.write_all(contents).map_err(io)?;
        let _ = tmp.persist(path).map_err(|e| io(e.error))?;
        Ok(())
    }
}

impl CacheStore for FileCache {
    fn exists(&self, domain: &str, kind: CacheKind, hash: &str) -> bool {
        self.artifact_path(domain, kind, hash).is_file()
    }

    fn get(&self, domain: &str, kind: CacheKind, hash: &str) -> Result<Option<String>, CacheError> {
        let path = self.artifact_path(domain, kind, hash);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    fn put(
        &self,
        domain: &str,
        kind: CacheKind,
        hash: &str,
        contents: &str,
        meta: &ArtifactMeta,
    ) -> Result<PathBuf, CacheError> {
        let path = self.artifact_path(domain, kind, hash);
        Self::write_atomic(&path, contents.as_bytes())?;

        let meta_path = Self::meta_path(&path);
        let meta = ArtifactMeta {
            size: Some(contents.len() as u64),
            stored_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs()),
            ..meta.clone()
        };
        let json = serde_json::to_vec(&meta).map_err(|source| CacheError::Meta {
            path: meta_path.clone(),
            source,
        })?;
        Self::write_atomic(&meta_path, &json)?;

        tracing::debug!(domain, %kind, hash, bytes = contents.len(), "stored cache artifact");
        Ok(path)
    }

    fn preserve(
        &self,
        domain: &str,
        kind: CacheKind,
        hash: &str,
        older_than: SystemTime,
    ) -> Result<(), CacheError> {
        let path = self.artifact_path(domain, kind, hash);
        let io = |source| CacheError::Io {
            path: path.clone(),
            source,
        };
        let modified = fs::metadata(&path).and_then(|m| m.modified()).map_err(io)?;
        if modified < older_than {
            fs::File::options()
                .write(true)
                .open(&path)
                .and_then(|file| file.set_modified(SystemTime::now()))
                .map_err(io)?;
        }
        Ok(())
    }

    fn meta(&self, domain: &str, kind: CacheKind, hash: &str) -> Option<ArtifactMeta> {
        let path = Self::meta_path(&self.artifact_path(domain, kind, hash));
        let bytes = fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn url(&self, domain: &str, kind: CacheKind, hash: &str) -> String {
        format!("{}/{}", self.base_url, Self::relative_path(domain, kind, hash))
    }
}
