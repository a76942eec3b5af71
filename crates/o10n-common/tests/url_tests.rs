//! Integration tests for URL resolution and site path mapping.

use std::fs;

use o10n_common::url::{
    filename, is_absolute, normalize_path, remove_host, resolve_url, split_origin, valid_protocol,
};
use o10n_common::{CdnRewrite, Site};

// ========== resolve_url ==========

#[test]
fn test_resolve_absolute_url_unchanged() {
    assert_eq!(
        resolve_url("https://cdn.test/a.css", Some("https://example.com/x/y.css")),
        "https://cdn.test/a.css"
    );
    assert_eq!(resolve_url("data:image/png;base64,AA==", None), "data:image/png;base64,AA==");
}

#[test]
fn test_resolve_relative_with_dot_segments() {
    assert_eq!(
        resolve_url("../img/bg.png", Some("https://example.com/theme/css/main.css")),
        "https://example.com/theme/img/bg.png"
    );
    assert_eq!(
        resolve_url("./font.woff2?v=2", Some("https://example.com/theme/main.css")),
        "https://example.com/theme/font.woff2?v=2"
    );
}

#[test]
fn test_resolve_root_relative_and_protocol_relative() {
    assert_eq!(
        resolve_url("/img/a.png", Some("https://example.com/theme/main.css")),
        "https://example.com/img/a.png"
    );
    assert_eq!(
        resolve_url("//fonts.test/a.css", Some("https://example.com/")),
        "https://fonts.test/a.css"
    );
    assert_eq!(resolve_url("../a.png", Some("/theme/css/b.css")), "/theme/a.png");
}

// ========== helpers ==========

#[test]
fn test_url_helpers() {
    assert!(is_absolute("http://a"));
    assert!(!is_absolute("/a.css"));
    assert!(!is_absolute("a.css"));
    assert!(valid_protocol("//cdn.test/x.css"));
    assert!(!valid_protocol("ftp://cdn.test/x.css"));
    assert_eq!(split_origin("https://a.test/x?y"), Some(("https://a.test", "/x?y")));
    assert_eq!(remove_host("https://a.test/x/y.css"), "/x/y.css");
    assert_eq!(remove_host("https://a.test"), "/");
    assert_eq!(filename("https://a.test/css/app.css?ver=3"), "app.css");
    assert_eq!(normalize_path("/a/../../b/./c"), "/b/c");
}

// ========== Site ==========

#[test]
fn test_site_root_path_and_protocol() {
    let site = Site::new("https://example.com/blog/", "/srv/www");
    assert_eq!(site.url(), "https://example.com/blog");
    assert_eq!(site.root_path(), "/blog/");
    assert_eq!(site.translate_protocol("//example.com/a.css"), "https://example.com/a.css");
    assert!(site.is_same_host("http://EXAMPLE.com/a.css"));
    assert!(!site.is_same_host("https://other.test/a.css"));
}

#[test]
fn test_site_local_path_resolves_existing_files_only() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("css")).unwrap();
    fs::write(dir.path().join("css/app.css"), "a{}").unwrap();
    let site = Site::new("https://example.com", dir.path());

    let expected = dir.path().join("css/app.css");
    assert_eq!(site.local_path("https://example.com/css/app.css?ver=1"), Some(expected.clone()));
    assert_eq!(site.local_path("/css/app.css"), Some(expected.clone()));
    assert_eq!(site.local_path("css/app.css"), Some(expected));
    assert_eq!(site.local_path("/css/missing.css"), None);
    assert_eq!(site.local_path("https://cdn.test/css/app.css"), None);
    assert_eq!(site.local_path("/../etc/passwd"), None);
}

// ========== CDN ==========

#[test]
fn test_cdn_rewrite_with_mask() {
    let site = Site::new("https://example.com", "/srv/www");
    let cdn = CdnRewrite {
        url: "https://cdn.test/".to_string(),
        mask: Some("/static/".to_string()),
    };
    assert_eq!(
        cdn.apply(&site, "https://example.com/static/css/a.css"),
        "https://cdn.test/css/a.css"
    );
    assert_eq!(cdn.apply(&site, "/other/a.css"), "/other/a.css");
    assert_eq!(cdn.apply(&site, "https://fonts.test/a.css"), "https://fonts.test/a.css");

    let plain = CdnRewrite {
        url: "https://cdn.test".to_string(),
        mask: None,
    };
    assert_eq!(plain.apply(&site, "/css/a.css"), "https://cdn.test/css/a.css");
}
