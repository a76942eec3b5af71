//! Text transforms applied around minification.

use std::sync::LazyLock;

use o10n_common::Notices;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::filter::Pattern;

static ROOT_DIR_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((?:\.\./)+(wp-(?:includes|admin|content))/")
        .unwrap_or_else(|e| unreachable!("root directory pattern is valid: {e}"))
});

/// Remove every `/*# sourceMappingURL=... */` comment.
///
/// An unterminated comment is removed to the end of the text.
#[must_use]
pub fn strip_source_maps(css: &str) -> String {
    const MARKER: &str = "/*# sourceMappingURL";
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find(MARKER) {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find("*/") {
            Some(end) => rest = &tail[end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Rewrite `(../../wp-content/` style references, which break when a
/// stylesheet moves into the cache directory, to root-relative paths.
#[must_use]
pub fn fix_root_paths(css: &str, root_path: &str) -> String {
    if !css.contains("../") {
        return css.to_string();
    }
    ROOT_DIR_REFERENCE
        .replace_all(css, |caps: &regex::Captures<'_>| {
            format!("({root_path}{}/", &caps[1])
        })
        .into_owned()
}

/// A search & replace rule as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceRule {
    /// Text or regular expression to find.
    pub search: String,
    /// Replacement (`$1` groups allowed for regex rules).
    #[serde(default)]
    pub replace: String,
    /// Treat `search` as a regular expression.
    #[serde(default)]
    pub regex: bool,
}

/// Compiled search & replace list applied to sources before minification.
///
/// String rules run first, then regex rules, each in configured order.
#[derive(Debug, Clone, Default)]
pub struct CssReplacer {
    strings: Vec<(String, String)>,
    regexes: Vec<(Regex, String)>,
    fingerprint: String,
}

impl CssReplacer {
    /// Compile rules, reporting and skipping invalid regexes.
    #[must_use]
    pub fn new(rules: &[ReplaceRule], notices: &mut Notices) -> Self {
        let mut replacer = Self::default();
        for rule in rules.iter().filter(|r| !r.search.is_empty()) {
            if rule.regex {
                match Pattern::regex(&rule.search) {
                    Ok(Pattern::Regex(re)) => replacer.regexes.push((re, rule.replace.clone())),
                    Ok(Pattern::Substring(_)) => {}
                    Err(err) => notices.warn_once("replace", err.to_string()),
                }
            } else {
                replacer
                    .strings
                    .push((rule.search.clone(), rule.replace.clone()));
            }
        }
        if !replacer.is_empty() {
            replacer.fingerprint = serde_json::to_string(rules).unwrap_or_default();
        }
        replacer
    }

    /// True when no rule is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.regexes.is_empty()
    }

    /// Identifies the rule set; part of minify cache keys.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Apply every rule to `css`.
    #[must_use]
    pub fn apply(&self, css: &str) -> String {
        let mut out = css.to_string();
        for (search, replace) in &self.strings {
            out = out.replace(search.as_str(), replace);
        }
        for (re, replace) in &self.regexes {
            out = re.replace_all(&out, replace.as_str()).into_owned();
        }
        out
    }
}
