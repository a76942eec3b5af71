//! Stylesheet tag scanning and output rewriting.
//!
//! # Scope
//!
//! This crate implements the HTML-facing parts of the optimizer:
//! - **Scanning** - locating `<link rel="stylesheet">` and `<style>` tags
//!   in raw markup without building a DOM
//!   - tags inside conditional comments (`<!--[if IE]> ... <![endif]-->`)
//!     are never selected
//!   - tolerant `href` / `media` attribute extraction for double-quoted,
//!     single-quoted and unquoted values
//! - **Rewriting** - an ordered search/replace registry applied to the page
//!   once every stage has decided what each tag becomes
//! - **Injections** - markup placed at named anchors in the document

/// Raw markup scanning for stylesheet tags.
pub mod scan;
/// Ordered output replacement and anchored injections.
pub mod rewrite;

pub use rewrite::{Anchor, Injections, OutputRewriter};
pub use scan::{
    LinkTag, StyleBlock, conditional_ranges, extract_href, find_link_tags, find_style_blocks, parse_media_attr,
    replace_href,
};

/// Escape a value for use inside a double-quoted HTML attribute.
#[must_use]
pub fn escape_attr(value: &str) -> String {
    html_escape::encode_double_quoted_attribute(value).into_owned()
}
