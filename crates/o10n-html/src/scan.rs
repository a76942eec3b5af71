use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// Conditional comment blocks. An unterminated block runs to the end of
/// the document.
static CONDITIONAL_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!--\[if[^\]]*\]>.*?(?:<!\[endif\]-->|\z)").unwrap_or_else(|e| {
        unreachable!("conditional comment pattern is valid: {e}")
    })
});

static LINK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<link\b[^>]*>")
        .unwrap_or_else(|e| unreachable!("link pattern is valid: {e}"))
});

static STYLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style\b([^>]*)>(.*?)</style\s*>")
        .unwrap_or_else(|e| unreachable!("style pattern is valid: {e}"))
});

static HREF_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\shref\s*=\s*").unwrap_or_else(|e| unreachable!("href pattern is valid: {e}"))
});

static MEDIA_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\smedia\s*=\s*")
        .unwrap_or_else(|e| unreachable!("media pattern is valid: {e}"))
});

static REL_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\srel\s*=\s*").unwrap_or_else(|e| unreachable!("rel pattern is valid: {e}"))
});

/// A `<link>` tag found outside conditional comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTag<'a> {
    /// The complete tag text, exactly as it appears in the document.
    pub tag: &'a str,
    /// Byte offset of the tag in the document.
    pub offset: usize,
}

impl LinkTag<'_> {
    /// True when the tag is a stylesheet link with a non-empty `href`.
    #[must_use]
    pub fn is_stylesheet(&self) -> bool {
        let rel_is_stylesheet = attr_value(self.tag, &REL_ATTR)
            .is_some_and(|rel| rel.to_ascii_lowercase().contains("stylesheet"));
        rel_is_stylesheet && extract_href(self.tag).is_some()
    }
}

/// An inline `<style>` block found outside conditional comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleBlock<'a> {
    /// The complete block including opening and closing tags.
    pub tag: &'a str,
    /// Raw attribute text of the opening tag.
    pub attrs: &'a str,
    /// The CSS between the tags.
    pub css: &'a str,
    /// Byte offset of the block in the document.
    pub offset: usize,
}

impl StyleBlock<'_> {
    /// Media query of the block, `"all"` when absent.
    #[must_use]
    pub fn media(&self) -> String {
        parse_media_attr(&format!("<style {}>", self.attrs))
    }
}

/// Byte ranges of conditional comment blocks.
#[must_use]
pub fn conditional_ranges(html: &str) -> Vec<Range<usize>> {
    CONDITIONAL_BLOCK
        .find_iter(html)
        .map(|m| m.range())
        .collect()
}

fn inside(ranges: &[Range<usize>], offset: usize) -> bool {
    ranges.iter().any(|r| r.contains(&offset))
}

/// Find every `<link>` tag in document order.
///
/// Tags inside conditional comments are skipped entirely, including every
/// link of a multi-tag conditional block.
#[must_use]
pub fn find_link_tags(html: &str) -> Vec<LinkTag<'_>> {
    let skip = conditional_ranges(html);
    LINK_TAG
        .find_iter(html)
        .filter(|m| !inside(&skip, m.start()))
        .map(|m| LinkTag {
            tag: m.as_str(),
            offset: m.start(),
        })
        .collect()
}

/// Find every `<style>` block in document order, skipping conditional
/// comments.
#[must_use]
pub fn find_style_blocks(html: &str) -> Vec<StyleBlock<'_>> {
    let skip = conditional_ranges(html);
    STYLE_BLOCK
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if inside(&skip, whole.start()) {
                return None;
            }
            Some(StyleBlock {
                tag: whole.as_str(),
                attrs: caps.get(1).map_or("", |m| m.as_str()),
                css: caps.get(2).map_or("", |m| m.as_str()),
                offset: whole.start(),
            })
        })
        .collect()
}

/// How an attribute value is delimited in the source tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    Double,
    Single,
    Bare,
}

/// Locate the value of an attribute.
///
/// The character after `=` selects the strategy: a quote runs to the
/// matching quote, anything else runs to whitespace or the end of the tag.
fn attr_span(tag: &str, attr: &Regex) -> Option<(Range<usize>, Quoting)> {
    let start = attr.find(tag)?.end();
    let rest = &tag[start..];
    match rest.chars().next()? {
        quote @ ('"' | '\'') => {
            let value_start = start + 1;
            let len = tag[value_start..].find(quote)?;
            let quoting = if quote == '"' {
                Quoting::Double
            } else {
                Quoting::Single
            };
            Some((value_start..value_start + len, quoting))
        }
        '>' => None,
        _ => {
            let mut len = rest
                .find(|c: char| c.is_whitespace() || c == '>')
                .unwrap_or(rest.len());
            // `href=a.css/>`: the slash closes the tag.
            if rest[..len].ends_with('/') && rest[len..].starts_with('>') {
                len -= 1;
            }
            Some((start..start + len, Quoting::Bare))
        }
    }
}

fn attr_value<'a>(tag: &'a str, attr: &Regex) -> Option<&'a str> {
    attr_span(tag, attr).map(|(range, _)| &tag[range])
}

/// Extract the `href` value of a tag.
///
/// Returns `None` when the attribute is missing or empty.
#[must_use]
pub fn extract_href(tag: &str) -> Option<&str> {
    attr_value(tag, &HREF_ATTR)
        .map(str::trim)
        .filter(|href| !href.is_empty())
}

/// Replace the `href` value of a tag, preserving every other byte.
///
/// The replacement keeps the original quoting; a bare value that needs
/// quoting is wrapped in double quotes. Tags without `href` are returned
/// unchanged.
#[must_use]
pub fn replace_href(tag: &str, new_href: &str) -> String {
    let Some((range, quoting)) = attr_span(tag, &HREF_ATTR) else {
        return tag.to_string();
    };
    let value = match quoting {
        Quoting::Double => new_href.replace('"', "&quot;"),
        Quoting::Single => new_href.replace('\'', "&#39;"),
        Quoting::Bare
            if new_href
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '>')) =>
        {
            format!("\"{}\"", new_href.replace('"', "&quot;"))
        }
        Quoting::Bare => new_href.to_string(),
    };
    format!("{}{value}{}", &tag[..range.start], &tag[range.end..])
}

/// Parse the `media` attribute of a tag, lowercased and trimmed.
///
/// Defaults to `"all"` when missing or empty.
#[must_use]
pub fn parse_media_attr(tag: &str) -> String {
    attr_value(tag, &MEDIA_ATTR)
        .map(|media| media.trim().to_lowercase())
        .filter(|media| !media.is_empty())
        .unwrap_or_else(|| "all".to_string())
}
