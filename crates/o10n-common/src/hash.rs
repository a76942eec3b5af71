//! Content hashing for cache keys.
//!
//! All keys are lowercase hex SHA-256 digests, so they are filesystem safe
//! and long enough to shard into two directory levels.

use sha2::{Digest, Sha256};

/// Hash arbitrary bytes into a lowercase hex digest.
#[must_use]
pub fn content_hash(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// Hash an ordered list of parts joined with `|`.
///
/// Used for keys derived from several inputs (a group key plus member
/// hashes, a URL plus a minifier fingerprint). Order matters.
#[must_use]
pub fn hash_parts<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize())
}
