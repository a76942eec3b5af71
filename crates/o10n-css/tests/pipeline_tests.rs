//! End-to-end tests of the stylesheet pipeline against a temporary
//! document root and artifact cache.

mod common;

use std::fs;

use common::{CountingCache, RecordingPush, StaticFetch, TestMinifier};
use o10n_common::Site;
use o10n_css::cache::DOMAIN;
use o10n_css::concat::Grouper;
use o10n_css::config::{AsyncOverrides, ConcatSettings};
use o10n_css::{
    CacheKind, CacheProxy, CacheStore, CssOptimizer, LightningMinifier, MinifiedSheet, Minifier,
    RawConfig, RenderContext, RenderReport, Services, Settings, SheetSource, StylesheetRecord,
};
use o10n_html::{extract_href, find_link_tags};
use serde_json::json;
use tempfile::TempDir;

const CACHE_URL: &str = "https://example.com/cache/";

struct Harness {
    docroot: TempDir,
    cache_dir: TempDir,
    cache: CountingCache,
    fetch: StaticFetch,
    minifier: TestMinifier,
    push: RecordingPush,
    site: Site,
}

struct Output {
    html: String,
    ctx: RenderContext,
    report: RenderReport,
}

impl Harness {
    fn new() -> Self {
        Self::with_minifier(TestMinifier::default())
    }

    fn with_minifier(minifier: TestMinifier) -> Self {
        let docroot = tempfile::tempdir().expect("document root");
        let cache_dir = tempfile::tempdir().expect("cache dir");
        let site = Site::new("https://example.com", docroot.path());
        let cache = CountingCache::new(cache_dir.path());
        Self {
            docroot,
            cache_dir,
            cache,
            fetch: StaticFetch::default(),
            minifier,
            push: RecordingPush::default(),
            site,
        }
    }

    fn write(&self, name: &str, css: &str) {
        fs::write(self.docroot.path().join(name), css).expect("write stylesheet");
    }

    fn run(&self, config: &str, html: &str) -> Output {
        self.run_with(&self.minifier, config, html)
    }

    fn run_with(&self, minifier: &dyn Minifier, config: &str, html: &str) -> Output {
        let raw = RawConfig::from_json(config).expect("valid config");
        let mut ctx = RenderContext::new();
        let settings = Settings::load(&raw, &mut ctx.notices);
        let proxy = CacheProxy::new(&self.cache, &self.fetch);
        let services = Services {
            cache: &self.cache,
            proxy: &proxy,
            minifier,
            push: Some(&self.push),
        };
        let optimizer = CssOptimizer::new(settings, &self.site, services);
        optimizer.setup_client(&mut ctx);
        let report = optimizer.process_html(html, &mut ctx);
        let html = ctx.finish(html);
        Output { html, ctx, report }
    }

    /// Contents of the artifact a cache URL points at.
    fn artifact(&self, url: &str) -> String {
        let relative = url.strip_prefix(CACHE_URL).expect("cache url");
        fs::read_to_string(self.cache_dir.path().join(relative)).expect("artifact exists")
    }
}

fn hrefs(html: &str) -> Vec<String> {
    find_link_tags(html)
        .into_iter()
        .filter_map(|link| extract_href(link.tag).map(str::to_string))
        .collect()
}

fn page(body: &str) -> String {
    format!("<html><head><title>t</title>{body}</head><body><p>x</p></body></html>")
}

const MINIFY: &str = r#"{"minify": {"enabled": true}}"#;

const CONCAT: &str = r#"{"minify": {"enabled": true, "concat": {"enabled": true}}}"#;

const CONCAT_ASYNC: &str = r#"{
    "minify": {"enabled": true, "concat": {"enabled": true}},
    "async": {"enabled": true}
}"#;

// ========== Minification ==========

#[test]
fn test_minified_link_points_at_src_artifact() {
    let h = Harness::new();
    h.write("a.css", "body {  color: red; }\n");
    let out = h.run(MINIFY, &page(r#"<link rel="stylesheet" href="/a.css">"#));

    assert_eq!(out.report.stylesheets, 1);
    assert_eq!(out.report.minified, 1);
    let links = hrefs(&out.html);
    assert_eq!(links.len(), 1);
    assert!(links[0].starts_with("https://example.com/cache/css/src/"));

    let artifact = h.artifact(&links[0]);
    assert!(artifact.starts_with("body { color: red; }"));
    assert!(artifact.ends_with("/* @src a.css */"));
}

#[test]
fn test_second_render_is_identical_and_writes_nothing() {
    let h = Harness::new();
    h.write("a.css", "a { color: red; }");
    h.write("b.css", "b { color: blue; }");
    let html = page(r#"<link rel="stylesheet" href="/a.css"><link rel="stylesheet" href="/b.css">"#);

    let first = h.run(CONCAT_ASYNC, &html);
    let puts = h.cache.puts.get();
    let calls = h.minifier.calls.get();
    assert_eq!(puts, 3);
    assert_eq!(calls, 2);

    let second = h.run(CONCAT_ASYNC, &html);
    assert_eq!(first.html, second.html);
    assert_eq!(h.cache.puts.get(), puts);
    assert_eq!(h.minifier.calls.get(), calls);
}

#[test]
fn test_changed_source_rebuilds_under_same_key() {
    let h = Harness::new();
    h.write("a.css", "a { color: red; }");
    let html = page(r#"<link rel="stylesheet" href="/a.css">"#);

    let first = h.run(MINIFY, &html);
    let _ = h.run(MINIFY, &html);
    assert_eq!(h.minifier.calls.get(), 1);

    h.write("a.css", "a { color: green; }");
    let third = h.run(MINIFY, &html);
    assert_eq!(h.minifier.calls.get(), 2);
    assert_eq!(hrefs(&first.html), hrefs(&third.html));
    assert!(h.artifact(&hrefs(&third.html)[0]).contains("green"));
}

#[test]
fn test_empty_stylesheet_is_removed() {
    let h = Harness::new();
    h.write("empty.css", "  \n ");
    h.write("a.css", "a { color: red; }");
    let html = page(r#"<link rel="stylesheet" href="/empty.css"><link rel="stylesheet" href="/a.css">"#);

    let out = h.run(MINIFY, &html);
    assert!(!out.html.contains("empty.css"));
    assert_eq!(out.report.minified, 1);
    let puts = h.cache.puts.get();

    let again = h.run(MINIFY, &html);
    assert!(!again.html.contains("empty.css"));
    assert_eq!(h.cache.puts.get(), puts);
    assert_eq!(h.minifier.calls.get(), 1);
}

#[test]
fn test_minifier_failure_keeps_original_tag() {
    let h = Harness::with_minifier(TestMinifier::failing());
    h.write("a.css", "a { color: red; }");
    let html = page(r#"<link rel="stylesheet" href="/a.css">"#);

    let out = h.run(MINIFY, &html);
    assert_eq!(hrefs(&out.html), ["/a.css"]);
    assert_eq!(out.report.minified, 0);
    assert_eq!(h.cache.puts.get(), 0);
}

#[test]
fn test_lightningcss_failure_keeps_original_tag() {
    let h = Harness::new();
    h.write("bad.css", "..broken { color: red }");
    h.write("a.css", "a {\n  color: red;\n}");
    let html = page(r#"<link rel="stylesheet" href="/bad.css"><link rel="stylesheet" href="/a.css">"#);

    let out = h.run_with(&LightningMinifier::default(), MINIFY, &html);
    assert_eq!(out.report.minified, 1);
    let links = hrefs(&out.html);
    assert_eq!(links[0], "/bad.css");
    assert!(h.artifact(&links[1]).starts_with("a{color:red}"));
}

#[test]
fn test_remote_sheet_is_downloaded_once() {
    let h = Harness::new();
    h.fetch.set("https://cdn.test/r.css", ".r { margin: 0; }");
    let html = page(r#"<link rel="stylesheet" href="https://cdn.test/r.css">"#);

    let first = h.run(MINIFY, &html);
    assert_eq!(first.report.minified, 1);
    assert_eq!(h.fetch.calls.get(), 1);

    let second = h.run(MINIFY, &html);
    assert_eq!(first.html, second.html);
    assert_eq!(h.fetch.calls.get(), 1);
    assert_eq!(h.minifier.calls.get(), 1);
}

#[test]
fn test_unreachable_remote_sheet_is_left_alone() {
    let h = Harness::new();
    let html = page(r#"<link rel="stylesheet" href="https://cdn.test/missing.css">"#);
    let out = h.run(MINIFY, &html);
    assert_eq!(hrefs(&out.html), ["https://cdn.test/missing.css"]);
    assert_eq!(out.report.minified, 0);
}

// ========== Extraction ==========

#[test]
fn test_conditional_comment_links_are_untouched() {
    let h = Harness::new();
    h.write("a.css", "a { color: red; }");
    h.write("ie.css", "a { zoom: 1; }");
    let conditional = r#"<!--[if IE]><link rel="stylesheet" href="/ie.css"><![endif]-->"#;
    let html = page(&format!(r#"{conditional}<link rel="stylesheet" href="/a.css">"#));

    let out = h.run(MINIFY, &html);
    assert_eq!(out.report.stylesheets, 1);
    assert!(out.html.contains(conditional));
}

#[test]
fn test_conditional_copy_of_async_tag_survives() {
    let h = Harness::new();
    let tag = r#"<link rel="stylesheet" href="/x.css">"#;
    let conditional = format!("<!--[if IE]>{tag}<![endif]-->");
    let html = page(&format!("{conditional}{tag}"));

    let out = h.run(r#"{"async": {"enabled": true}}"#, &html);
    assert_eq!(out.report.async_entries, 1);
    assert!(out.html.contains(&conditional));
    assert!(!out.html.contains("<!--[if IE]><![endif]-->"));
}

#[test]
fn test_url_rules_delete_and_replace() {
    let h = Harness::new();
    let config = r#"{"url_filter": {"enabled": true, "config": [
        {"url": "ads.css", "delete": true},
        {"url": "old.css", "replace": "/new.css"},
        {"url": "keep.css", "ignore": true}
    ]}}"#;
    let html = page(concat!(
        r#"<link rel="stylesheet" href="/ads.css">"#,
        r#"<link rel="stylesheet" href="/old.css">"#,
        r#"<link rel="stylesheet" href="/keep.css">"#,
    ));

    let out = h.run(config, &html);
    assert_eq!(hrefs(&out.html), ["/new.css", "/keep.css"]);
    assert_eq!(out.report.stylesheets, 1);
}

// ========== Concatenation ==========

#[test]
fn test_blocking_group_replaces_last_member() {
    let h = Harness::new();
    h.write("a.css", "a { color: red; }");
    h.write("b.css", "b { color: blue; }");
    let html = page(r#"<link rel="stylesheet" href="/a.css"><link rel="stylesheet" href="/b.css">"#);

    let out = h.run(CONCAT, &html);
    assert_eq!(out.report.groups, 1);
    let links = hrefs(&out.html);
    assert_eq!(links.len(), 1);
    assert!(links[0].starts_with("https://example.com/cache/css/concat/"));

    let artifact = h.artifact(&links[0]);
    let red = artifact.find("color: red").expect("first member");
    let blue = artifact.find("color: blue").expect("second member");
    assert!(red < blue);
    assert!(artifact.ends_with("/* @concat */"));
}

#[test]
fn test_inline_blocks_join_the_group() {
    let h = Harness::new();
    h.write("a.css", "a { color: red; }");
    let config = r#"{"minify": {"enabled": true, "concat": {"enabled": true, "inline": {"enabled": true}}}}"#;
    let html = page(r#"<style>.i { top: 0; }</style><link rel="stylesheet" href="/a.css"><style> </style>"#);

    let out = h.run(config, &html);
    assert!(!out.html.contains("<style"));
    let links = hrefs(&out.html);
    assert_eq!(links.len(), 1);
    let artifact = h.artifact(&links[0]);
    assert!(artifact.starts_with(".i { top: 0; }"));
    assert!(artifact.contains("color: red"));
}

#[test]
fn test_group_minify_failure_joins_sources() {
    let h = Harness::new();
    h.write("a.css", "a {\n  color: red;\n}");
    let config = r#"{"minify": {"enabled": true, "concat": {
        "enabled": true, "minify": true, "inline": {"enabled": true}
    }}}"#;
    let html = page(r#"<link rel="stylesheet" href="/a.css"><style>..broken { top: 0 }</style>"#);

    let out = h.run_with(&LightningMinifier::default(), config, &html);
    let links = hrefs(&out.html);
    assert_eq!(links.len(), 1);
    let artifact = h.artifact(&links[0]);
    assert!(artifact.starts_with("a{color:red}"));
    assert!(artifact.contains("..broken { top: 0 }"));
    assert!(artifact.ends_with("/* @concat */"));
}

#[test]
fn test_group_hash_depends_only_on_member_hashes() {
    let settings = ConcatSettings {
        minify: false,
        filter: None,
        inline: None,
        media_queries: None,
    };
    let record = |href: &str, key: &str, fingerprint: &str| StylesheetRecord {
        tag: format!(r#"<link rel="stylesheet" href="{href}">"#),
        source: SheetSource::Link {
            href: href.to_string(),
        },
        media: "all".to_string(),
        minify: true,
        is_async: false,
        rewrite: false,
        proxy: None,
        minified: Some(MinifiedSheet {
            key: key.to_string(),
            fingerprint: fingerprint.to_string(),
        }),
        overrides: AsyncOverrides::default(),
        offset: 0,
    };
    let group_hash = |records: &[StylesheetRecord]| {
        let mut notices = o10n_common::Notices::new();
        let mut grouper = Grouper::new(&settings, None);
        for (position, record) in records.iter().enumerate() {
            assert!(grouper.assign(record, position, &mut notices));
        }
        let groups = grouper.into_groups();
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].is_async);
        groups[0].hash()
    };

    let original = group_hash(&[record("/a.css", "k1", "f1"), record("/b.css", "k2", "f2")]);
    let renamed = group_hash(&[record("/x.css", "k1", "f1"), record("/y.css", "k2", "f2")]);
    let changed = group_hash(&[record("/a.css", "k1", "f1"), record("/b.css", "k2", "f3")]);
    assert_eq!(original, renamed);
    assert_ne!(original, changed);
}

#[test]
fn test_concat_minify_switch_changes_artifact_key() {
    let h = Harness::new();
    h.write("a.css", "a {  color: red; }");
    h.write("b.css", "b {  color: blue; }");
    let html = page(r#"<link rel="stylesheet" href="/a.css"><link rel="stylesheet" href="/b.css">"#);
    let plain = r#"{"minify": {"enabled": true, "concat": {"enabled": true, "minify": false}}}"#;
    let minified = r#"{"minify": {"enabled": true, "concat": {"enabled": true, "minify": true}}}"#;

    let first = h.run(plain, &html);
    let calls = h.minifier.calls.get();
    let first_link = hrefs(&first.html).remove(0);
    assert!(!h.artifact(&first_link).contains("@min"));

    let second = h.run(minified, &html);
    let second_link = hrefs(&second.html).remove(0);
    assert_ne!(first_link, second_link);
    assert_eq!(h.minifier.calls.get(), calls + 1);
    assert!(h.artifact(&second_link).ends_with("@concat @min test */"));

    let again = h.run(plain, &html);
    assert_eq!(hrefs(&again.html), [first_link]);
    assert_eq!(h.minifier.calls.get(), calls + 1);
}

#[test]
fn test_segregated_media_gets_own_group() {
    let h = Harness::new();
    h.write("a.css", "a { color: red; }");
    h.write("p.css", "a { color: black; }");
    let html = page(r#"<link rel="stylesheet" href="/a.css"><link rel="stylesheet" href="/p.css" media="print">"#);

    let out = h.run(CONCAT, &html);
    assert_eq!(out.report.groups, 2);
    assert!(out.html.contains(r#"media="print""#));
}

// ========== Async loading ==========

#[test]
fn test_async_sheets_are_listed_for_the_loader() {
    let h = Harness::new();
    let config = r#"{"async": {"enabled": true, "rel_preload": true, "noscript": true}}"#;
    let html = page(concat!(
        r#"<link rel="stylesheet" href="/a.css">"#,
        r#"<link rel="stylesheet" href="https://cdn.test/b.css" media="print">"#,
    ));

    let out = h.run(config, &html);
    assert_eq!(out.report.async_entries, 2);
    assert_eq!(
        out.ctx.client.get("css", "async"),
        Some(&json!([[1, "/a.css"], [1, "https://cdn.test/b.css", "print"]]))
    );
    assert!(out.ctx.client.modules().iter().any(|m| m == "css"));

    // only the <noscript> copy remains
    assert_eq!(out.html.matches(r#"<link rel="stylesheet" href="/a.css">"#).count(), 1);
    assert!(out.html.contains(r#"<link rel="preload" as="style" href="/a.css""#));
    assert!(out.html.contains("<noscript><link rel=\"stylesheet\" href=\"/a.css\">"));
    assert!(out.html.contains("var o10n_config="));
}

#[test]
fn test_async_group_is_one_concat_entry() {
    let h = Harness::new();
    h.write("a.css", "a { color: red; }");
    h.write("b.css", "b { color: blue; }");
    let html = page(r#"<link rel="stylesheet" href="/a.css"><link rel="stylesheet" href="/b.css">"#);

    let out = h.run(CONCAT_ASYNC, &html);
    assert!(hrefs(&out.html).is_empty());
    assert_eq!(out.report.async_entries, 1);
    assert_eq!(out.ctx.client.get("css", "concat"), Some(&json!(1)));

    let list = out.ctx.client.get("css", "async").expect("async list");
    let hash = list[0][0].as_str().expect("group hash");
    assert!(h.cache.exists(DOMAIN, CacheKind::Concat, hash));
}

// ========== Delivery ==========

#[test]
fn test_cdn_rewrite_and_push() {
    let h = Harness::new();
    h.write("a.css", "a { color: red; }");
    let config = r#"{
        "minify": {"enabled": true},
        "cdn": {"enabled": true, "url": "https://cdn.example.net"},
        "http2_push": {"enabled": true}
    }"#;

    let out = h.run(config, &page(r#"<link rel="stylesheet" href="/a.css">"#));
    let links = hrefs(&out.html);
    assert!(links[0].starts_with("https://cdn.example.net/cache/css/src/"));

    let pushed = h.push.pushed.borrow();
    assert_eq!(pushed.len(), 1);
    assert!(pushed[0].starts_with(CACHE_URL));
}
