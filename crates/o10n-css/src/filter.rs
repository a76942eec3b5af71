//! Include/exclude filter engine.
//!
//! Two filter shapes are used throughout the configuration:
//!
//! - [`ListFilter`]: a plain list of patterns. In include mode a candidate
//!   passes when any pattern matches; in exclude mode when none does.
//! - [`ConfigFilter`]: an ordered list of rules. Each rule carries match
//!   entries and arbitrary options (a group key, async overrides, ...). The
//!   first matching rule assigns the candidate; after that only exclude
//!   entries are still evaluated, and any exclude hit rejects outright.
//!   Its mode is the default for candidates no rule matches.
//!
//! Patterns are substring matches unless marked as regular expressions.
//! Malformed patterns are reported through [`Notices`] and dropped.

use o10n_common::{Notices, content_hash};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Whether a filter selects or deselects what it matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Matches are selected; everything else is not.
    #[default]
    Include,
    /// Matches are deselected; everything else is selected.
    Exclude,
}

/// A single compiled pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Plain substring test.
    Substring(String),
    /// Regular expression test.
    Regex(Regex),
}

impl Pattern {
    /// Compile a regular expression.
    ///
    /// Delimited patterns (`/pattern/flags`, `#pattern#i`) are accepted and
    /// their trailing flags translated to inline flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] when the expression does not
    /// compile.
    pub fn regex(source: &str) -> Result<Self, ConfigError> {
        let pattern = strip_delimiters(source).unwrap_or_else(|| source.to_string());
        Regex::new(&pattern)
            .map(Self::Regex)
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: source.to_string(),
                message: e.to_string(),
            })
    }

    /// True when the pattern matches anywhere in `text`.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Substring(needle) => text.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(text),
        }
    }
}

fn strip_delimiters(source: &str) -> Option<String> {
    let delimiter = source.chars().next()?;
    if !matches!(delimiter, '/' | '#' | '~' | '@' | '%' | '!') {
        return None;
    }
    let end = source.rfind(delimiter)?;
    if end == 0 {
        return None;
    }
    let flags = &source[end + 1..];
    if !flags.chars().all(|c| matches!(c, 'i' | 'm' | 's' | 'x' | 'u' | 'U')) {
        return None;
    }
    let body = &source[1..end];
    let flags: String = flags.chars().filter(|&c| c != 'u').collect();
    Some(if flags.is_empty() {
        body.to_string()
    } else {
        format!("(?{flags}){body}")
    })
}

/// A pattern plus its exclude flag, as used inside rule match lists.
#[derive(Debug, Clone)]
pub struct MatchEntry {
    /// Compiled pattern.
    pub pattern: Pattern,
    /// A hit on this entry rejects the candidate.
    pub exclude: bool,
}

impl MatchEntry {
    /// Parse an entry: either a plain string (substring) or an object
    /// `{"string": .., "regex": bool, "exclude": bool}`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unusable shapes and invalid regexes.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::String(s) if !s.is_empty() => Ok(Self {
                pattern: Pattern::Substring(s.clone()),
                exclude: false,
            }),
            Value::Object(map) => {
                let Some(text) = ["string", "match", "pattern"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .filter(|s| !s.is_empty())
                else {
                    return Err(ConfigError::MalformedEntry(value.to_string()));
                };
                let is_regex = map.get("regex").and_then(Value::as_bool).unwrap_or(false);
                let pattern = if is_regex {
                    Pattern::regex(text)?
                } else {
                    Pattern::Substring(text.to_string())
                };
                Ok(Self {
                    pattern,
                    exclude: map.get("exclude").and_then(Value::as_bool).unwrap_or(false),
                })
            }
            other => Err(ConfigError::MalformedEntry(other.to_string())),
        }
    }
}

fn entries_from_value(value: &Value, notices: &mut Notices) -> Vec<MatchEntry> {
    let items: &[Value] = match value {
        Value::Array(items) => items,
        other => std::slice::from_ref(other),
    };
    items
        .iter()
        .filter_map(|item| match MatchEntry::from_value(item) {
            Ok(entry) => Some(entry),
            Err(err) => {
                notices.warn_once("filter", err.to_string());
                None
            }
        })
        .collect()
}

/// A flat include or exclude list.
#[derive(Debug, Clone)]
pub struct ListFilter {
    mode: FilterMode,
    patterns: Vec<MatchEntry>,
}

impl ListFilter {
    /// Create a filter from compiled entries.
    #[must_use]
    pub const fn new(mode: FilterMode, patterns: Vec<MatchEntry>) -> Self {
        Self { mode, patterns }
    }

    /// Compile a filter list from configuration.
    ///
    /// Returns `None` when no usable pattern remains, which callers treat
    /// as "filter not configured".
    #[must_use]
    pub fn from_value(mode: FilterMode, value: &Value, notices: &mut Notices) -> Option<Self> {
        let patterns = entries_from_value(value, notices);
        (!patterns.is_empty()).then(|| Self::new(mode, patterns))
    }

    /// Filter mode.
    #[must_use]
    pub const fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Apply the filter: include passes on any match, exclude passes on
    /// no match.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        let hit = self.patterns.iter().any(|entry| entry.pattern.matches(text));
        match self.mode {
            FilterMode::Include => hit,
            FilterMode::Exclude => !hit,
        }
    }
}

/// One rule of a [`ConfigFilter`].
#[derive(Debug, Clone)]
pub struct FilterRule {
    entries: Vec<MatchEntry>,
    exclude: bool,
    key: String,
    explicit_key: Option<String>,
    options: Map<String, Value>,
}

impl FilterRule {
    /// Parse a rule from its JSON form.
    ///
    /// `match_field` names the list holding the match entries (`match` for
    /// tag rules, `match_concat` for concat group rules). A plain string is
    /// a rule with a single substring entry and no options.
    ///
    /// Returns `None` (with notices) when no usable entry remains.
    #[must_use]
    pub fn from_value(value: &Value, match_field: &str, notices: &mut Notices) -> Option<Self> {
        let (entries, options) = match value {
            Value::String(_) => (entries_from_value(value, notices), Map::new()),
            Value::Object(map) => {
                let Some(list) = map.get(match_field) else {
                    notices.warn_once(
                        "filter",
                        format!("rule without `{match_field}` ignored: {value}"),
                    );
                    return None;
                };
                (entries_from_value(list, notices), map.clone())
            }
            other => {
                notices.warn_once("filter", format!("malformed filter rule: {other}"));
                return None;
            }
        };
        if entries.is_empty() {
            return None;
        }

        let explicit_key = options
            .get("group")
            .and_then(|group| group.get("key"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let key = explicit_key
            .clone()
            .unwrap_or_else(|| content_hash(value.to_string()));
        let exclude = options
            .get("exclude")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Some(Self {
            entries,
            exclude,
            key,
            explicit_key,
            options,
        })
    }

    /// Group key: the configured `group.key`, else a hash of the rule.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The configured `group.key`, if any.
    #[must_use]
    pub fn explicit_key(&self) -> Option<&str> {
        self.explicit_key.as_deref()
    }

    /// The rule object as configured.
    #[must_use]
    pub const fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// True when every entry of the rule rejects.
    #[must_use]
    pub const fn is_exclude(&self) -> bool {
        self.exclude
    }
}

/// Outcome of evaluating a [`ConfigFilter`].
#[derive(Debug, Clone, Copy)]
pub enum FilterDecision<'a> {
    /// An exclude entry matched.
    Rejected,
    /// No rule matched.
    Unmatched,
    /// The candidate was assigned to this rule.
    Matched(&'a FilterRule),
}

impl FilterDecision<'_> {
    /// Whether the candidate is selected. For rule filters the mode is
    /// the default for unmatched candidates: `include` keeps them,
    /// `exclude` drops them.
    #[must_use]
    pub const fn selected(&self, mode: FilterMode) -> bool {
        match self {
            Self::Rejected => false,
            Self::Unmatched => matches!(mode, FilterMode::Include),
            Self::Matched(_) => true,
        }
    }
}

/// Ordered rule list with per-rule options.
#[derive(Debug, Clone)]
pub struct ConfigFilter {
    mode: FilterMode,
    rules: Vec<FilterRule>,
}

impl ConfigFilter {
    /// Compile rules from configuration.
    ///
    /// Rules sharing an explicit group key collapse into one: the later
    /// rule replaces the earlier one in place. Returns `None` when no
    /// usable rule remains.
    #[must_use]
    pub fn from_value(mode: FilterMode, value: &Value, notices: &mut Notices) -> Option<Self> {
        Self::from_rules(mode, value, "match", notices)
    }

    fn from_rules(
        mode: FilterMode,
        value: &Value,
        match_field: &str,
        notices: &mut Notices,
    ) -> Option<Self> {
        let Value::Array(items) = value else {
            notices.warn_once("filter", format!("filter config is not a list: {value}"));
            return None;
        };
        let mut rules: Vec<FilterRule> = Vec::new();
        for item in items {
            let Some(rule) = FilterRule::from_value(item, match_field, notices) else {
                continue;
            };
            let existing = rule
                .explicit_key()
                .and_then(|key| rules.iter().position(|r| r.explicit_key() == Some(key)));
            match existing {
                Some(index) => rules[index] = rule,
                None => rules.push(rule),
            }
        }
        (!rules.is_empty()).then_some(Self { mode, rules })
    }

    /// Split an async filter into tag rules and `match_concat` group rules.
    #[must_use]
    pub fn split_concat(
        mode: FilterMode,
        value: &Value,
        notices: &mut Notices,
    ) -> (Option<Self>, Option<Self>) {
        let Value::Array(items) = value else {
            return (Self::from_value(mode, value, notices), None);
        };
        let (concat, tags): (Vec<Value>, Vec<Value>) = items
            .iter()
            .cloned()
            .partition(|item| item.get("match_concat").is_some());
        let tags = if tags.is_empty() {
            None
        } else {
            Self::from_rules(mode, &Value::Array(tags), "match", notices)
        };
        let concat = if concat.is_empty() {
            None
        } else {
            Self::from_rules(mode, &Value::Array(concat), "match_concat", notices)
        };
        (tags, concat)
    }

    /// Filter mode.
    #[must_use]
    pub const fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Compiled rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Evaluate the rules against `text`.
    #[must_use]
    pub fn evaluate(&self, text: &str) -> FilterDecision<'_> {
        let mut assigned: Option<&FilterRule> = None;
        for rule in &self.rules {
            for entry in &rule.entries {
                let excluding = entry.exclude || rule.exclude;
                // once assigned, only exclude entries can change the outcome
                if assigned.is_some() && !excluding {
                    continue;
                }
                if !entry.pattern.matches(text) {
                    continue;
                }
                if excluding {
                    return FilterDecision::Rejected;
                }
                assigned = Some(rule);
            }
        }
        assigned.map_or(FilterDecision::Unmatched, FilterDecision::Matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_delimiters() {
        assert_eq!(strip_delimiters("/abc/i").as_deref(), Some("(?i)abc"));
        assert_eq!(strip_delimiters("#a/b#").as_deref(), Some("a/b"));
        assert_eq!(strip_delimiters("abc"), None);
        assert_eq!(strip_delimiters("/abc"), None);
        assert_eq!(strip_delimiters("/a/bc"), None);
    }
}
