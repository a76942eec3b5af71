//! Integration tests for stylesheet tag scanning.

use o10n_html::{
    extract_href, find_link_tags, find_style_blocks, parse_media_attr, replace_href,
};

fn stylesheet_hrefs(html: &str) -> Vec<&str> {
    find_link_tags(html)
        .into_iter()
        .filter(|link| link.is_stylesheet())
        .filter_map(|link| extract_href(link.tag))
        .collect()
}

// ========== link scanning ==========

#[test]
fn test_finds_stylesheet_links_in_order() {
    let html = r#"<html><head>
<link rel="stylesheet" href="/a.css">
<link rel="icon" href="/favicon.ico">
<LINK REL='stylesheet' HREF='/b.css' media='print'>
<link rel=stylesheet href=/c.css>
</head></html>"#;
    assert_eq!(stylesheet_hrefs(html), vec!["/a.css", "/b.css", "/c.css"]);
}

#[test]
fn test_conditional_comment_links_are_skipped() {
    let html = r#"<head>
<!--[if lt IE 9]>
<link rel="stylesheet" href="/ie1.css">
<link rel="stylesheet" href="/ie2.css">
<![endif]-->
<!--[if IE]><link rel="stylesheet" href="/ie3.css"><![endif]-->
<link rel="stylesheet" href="/main.css">
</head>"#;
    assert_eq!(stylesheet_hrefs(html), vec!["/main.css"]);
}

#[test]
fn test_unterminated_conditional_comment_skips_rest() {
    let html = r#"<link rel="stylesheet" href="/a.css"><!--[if IE]><link rel="stylesheet" href="/b.css">"#;
    assert_eq!(stylesheet_hrefs(html), vec!["/a.css"]);
}

#[test]
fn test_links_without_href_are_not_stylesheets() {
    let html = r#"<link rel="stylesheet"><link rel="stylesheet" href="">"#;
    assert!(stylesheet_hrefs(html).is_empty());
}

#[test]
fn test_link_offsets_point_at_tag() {
    let html = r#"<p>x</p><link rel="stylesheet" href="/a.css">"#;
    let links = find_link_tags(html);
    assert_eq!(links.len(), 1);
    assert_eq!(&html[links[0].offset..links[0].offset + 5], "<link");
}

// ========== style blocks ==========

#[test]
fn test_finds_style_blocks_with_media() {
    let html = "<style>a{color:red}</style><style media=\"Print \">b{}</style><styles>x</styles>";
    let blocks = find_style_blocks(html);
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].css, "a{color:red}");
    assert_eq!(blocks[0].media(), "all");
    assert_eq!(blocks[1].css, "b{}");
    assert_eq!(blocks[1].media(), "print");
}

// ========== href handling ==========

#[test]
fn test_extract_href_quoting_modes() {
    assert_eq!(extract_href(r#"<link href="/a.css" rel="stylesheet">"#), Some("/a.css"));
    assert_eq!(extract_href("<link href='/b.css' rel='stylesheet'>"), Some("/b.css"));
    assert_eq!(extract_href("<link href=/c.css rel=stylesheet>"), Some("/c.css"));
    assert_eq!(extract_href("<link rel=stylesheet href=/d.css/>"), Some("/d.css"));
    assert_eq!(extract_href("<link\nhref = \"/e.css\">"), Some("/e.css"));
    assert_eq!(extract_href(r#"<link data-href="/x.css">"#), None);
}

#[test]
fn test_replace_href_round_trip() {
    let tags = [
        r#"<link rel="stylesheet" href="/a.css" media="all">"#,
        "<link rel='stylesheet' href='/a.css'>",
        "<link rel=stylesheet href=/a.css>",
    ];
    for tag in tags {
        let replaced = replace_href(tag, "https://cdn.test/x.css?v=1");
        assert_eq!(extract_href(&replaced), Some("https://cdn.test/x.css?v=1"));
        assert_eq!(replaced.replace("https://cdn.test/x.css?v=1", "/a.css"), tag);
    }
}

#[test]
fn test_replace_href_without_href_is_identity() {
    let tag = r#"<link rel="stylesheet">"#;
    assert_eq!(replace_href(tag, "/x.css"), tag);
}

#[test]
fn test_parse_media_attr_defaults_and_normalizes() {
    assert_eq!(parse_media_attr(r#"<link href="/a.css">"#), "all");
    assert_eq!(parse_media_attr(r#"<link media=" Screen AND (min-width:600px) ">"#), "screen and (min-width:600px)");
    assert_eq!(parse_media_attr("<link media=print>"), "print");
    assert_eq!(parse_media_attr(r#"<link media="">"#), "all");
}
