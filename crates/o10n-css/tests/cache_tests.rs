//! Integration tests for the file-backed artifact cache.

use std::fs;
use std::time::{Duration, SystemTime};

use o10n_css::cache::{DOMAIN, preserve_threshold};
use o10n_css::{ArtifactMeta, CacheKind, CacheStore, FileCache};
use tempfile::TempDir;

const HASH: &str = "abcdef0123456789";

fn cache() -> (TempDir, FileCache) {
    let dir = tempfile::tempdir().expect("cache dir");
    let cache = FileCache::new(dir.path(), "https://example.com/cache/");
    (dir, cache)
}

fn set_age(cache: &FileCache, age: Duration) -> SystemTime {
    let path = cache.artifact_path(DOMAIN, CacheKind::Src, HASH);
    let when = SystemTime::now() - age;
    fs::File::options()
        .write(true)
        .open(&path)
        .and_then(|file| file.set_modified(when))
        .expect("set mtime");
    when
}

fn modified(cache: &FileCache) -> SystemTime {
    let path = cache.artifact_path(DOMAIN, CacheKind::Src, HASH);
    fs::metadata(path).and_then(|m| m.modified()).expect("mtime")
}

// ========== Layout ==========

#[test]
fn test_artifacts_are_sharded_by_hash() {
    let (dir, cache) = cache();
    assert!(!cache.exists(DOMAIN, CacheKind::Src, HASH));
    assert_eq!(cache.get(DOMAIN, CacheKind::Src, HASH).expect("read"), None);

    let path = cache
        .put(DOMAIN, CacheKind::Src, HASH, "a{}", &ArtifactMeta::fingerprint("v1"))
        .expect("store");
    assert_eq!(path, dir.path().join("css/src/ab/cd/abcdef0123456789.css"));
    assert!(cache.exists(DOMAIN, CacheKind::Src, HASH));
    assert!(!cache.exists(DOMAIN, CacheKind::Concat, HASH));
    assert_eq!(
        cache.get(DOMAIN, CacheKind::Src, HASH).expect("read").as_deref(),
        Some("a{}")
    );
    assert_eq!(
        cache.url(DOMAIN, CacheKind::Proxy, HASH),
        "https://example.com/cache/css/proxy/ab/cd/abcdef0123456789.css"
    );
}

#[test]
fn test_meta_sidecar_records_size() {
    let (_dir, cache) = cache();
    assert!(cache.meta(DOMAIN, CacheKind::Concat, HASH).is_none());

    let _ = cache
        .put(DOMAIN, CacheKind::Concat, HASH, "b{top:0}", &ArtifactMeta::group(Some("footer")))
        .expect("store");
    let meta = cache.meta(DOMAIN, CacheKind::Concat, HASH).expect("meta");
    assert_eq!(meta.group_key.as_deref(), Some("footer"));
    assert_eq!(meta.size, Some(8));
    assert!(meta.fingerprint.is_none());
    assert!(meta.stored_at.is_some());
}

#[test]
fn test_put_overwrites_previous_artifact() {
    let (_dir, cache) = cache();
    for css in ["old{}", "new{}"] {
        let _ = cache
            .put(DOMAIN, CacheKind::Src, HASH, css, &ArtifactMeta::fingerprint(css))
            .expect("store");
    }
    assert_eq!(
        cache.get(DOMAIN, CacheKind::Src, HASH).expect("read").as_deref(),
        Some("new{}")
    );
    let meta = cache.meta(DOMAIN, CacheKind::Src, HASH).expect("meta");
    assert_eq!(meta.fingerprint.as_deref(), Some("new{}"));
}

// ========== Preserve ==========

#[test]
fn test_preserve_bumps_stale_artifacts() {
    let (_dir, cache) = cache();
    let _ = cache
        .put(DOMAIN, CacheKind::Src, HASH, "a{}", &ArtifactMeta::default())
        .expect("store");
    let old = set_age(&cache, Duration::from_secs(7200));

    cache
        .preserve(DOMAIN, CacheKind::Src, HASH, preserve_threshold())
        .expect("preserve");
    assert!(modified(&cache) > old + Duration::from_secs(3600));
}

#[test]
fn test_preserve_leaves_recent_artifacts() {
    let (_dir, cache) = cache();
    let _ = cache
        .put(DOMAIN, CacheKind::Src, HASH, "a{}", &ArtifactMeta::default())
        .expect("store");
    let _ = set_age(&cache, Duration::from_secs(600));

    cache
        .preserve(DOMAIN, CacheKind::Src, HASH, preserve_threshold())
        .expect("preserve");
    assert!(modified(&cache) < SystemTime::now() - Duration::from_secs(300));
}

#[test]
fn test_preserve_missing_artifact_is_an_error() {
    let (_dir, cache) = cache();
    assert!(
        cache
            .preserve(DOMAIN, CacheKind::Src, HASH, preserve_threshold())
            .is_err()
    );
}
