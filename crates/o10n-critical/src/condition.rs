//! Condition tree evaluation.
//!
//! A condition tree is a list of OR-groups. Each group is either a single
//! condition object or a list of condition objects that must all match:
//!
//! ```json
//! [
//!   {"method": "is_front_page"},
//!   [{"method": "is_page"}, {"method": "post_type", "result": ["page", "post"]}]
//! ]
//! ```
//!
//! Predicate results are memoized for one [`ConditionEvaluator`], which is
//! created per render and shared by every entry of that render.

use std::collections::HashMap;

use o10n_common::Notices;
use serde::Deserialize;
use serde_json::Value;

use crate::predicate::{PredicateError, PredicateRegistry};

/// One predicate call and the result it must produce.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Condition {
    /// Registered predicate name.
    pub method: String,
    /// Positional arguments; a non-list value is a single argument.
    #[serde(default)]
    pub arguments: Option<Value>,
    /// Expected result, `true` when absent. A list accepts any member.
    #[serde(default)]
    pub result: Option<Value>,
}

impl Condition {
    /// Memo key: the method alone, or the method and its JSON arguments.
    #[must_use]
    pub fn memo_key(&self) -> String {
        match &self.arguments {
            None => self.method.clone(),
            Some(arguments) => format!("{}:{arguments}", self.method),
        }
    }

    /// Arguments as a positional list.
    #[must_use]
    pub fn argument_list(&self) -> Vec<Value> {
        match &self.arguments {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(value) => vec![value.clone()],
        }
    }

    /// Compare a predicate result with the expectation (strict equality).
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match &self.result {
            None => *value == Value::Bool(true),
            Some(Value::Array(options)) => options.contains(value),
            Some(expected) => value == expected,
        }
    }
}

/// Split a condition tree into AND-lists; a lone object forms its own
/// group. Scalars are not groups and are skipped.
#[must_use]
pub fn or_groups(conditions: &[Value]) -> Vec<Vec<&Value>> {
    conditions
        .iter()
        .filter_map(|group| match group {
            Value::Object(_) => Some(vec![group]),
            Value::Array(items) => Some(items.iter().collect()),
            _ => None,
        })
        .collect()
}

/// Evaluates condition trees with per-pass memoization.
pub struct ConditionEvaluator<'r> {
    registry: &'r PredicateRegistry,
    memo: HashMap<String, Value>,
    calls: usize,
}

impl<'r> ConditionEvaluator<'r> {
    /// Start an evaluation pass.
    #[must_use]
    pub fn new(registry: &'r PredicateRegistry) -> Self {
        Self {
            registry,
            memo: HashMap::new(),
            calls: 0,
        }
    }

    /// Predicate invocations so far (memo hits excluded).
    #[must_use]
    pub const fn calls(&self) -> usize {
        self.calls
    }

    /// True when any OR-group fully matches. An empty tree matches.
    ///
    /// Unknown methods and malformed conditions are reported to `notices`
    /// and count as non-matching.
    pub fn matches(&mut self, conditions: &[Value], notices: &mut Notices) -> bool {
        if conditions.is_empty() {
            return true;
        }
        or_groups(conditions).into_iter().any(|group| {
            !group.is_empty()
                && group.into_iter().all(|condition| match self.check(condition) {
                    Ok(matched) => matched,
                    Err(err) => {
                        notices.warn_once("critical", err.to_string());
                        false
                    }
                })
        })
    }

    fn check(&mut self, condition: &Value) -> Result<bool, PredicateError> {
        let condition = Condition::deserialize(condition)
            .map_err(|_| PredicateError::MalformedCondition(condition.to_string()))?;
        let value = self.call(&condition)?;
        Ok(condition.accepts(&value))
    }

    /// Result of a condition's predicate call, memoized.
    ///
    /// # Errors
    ///
    /// Returns [`PredicateError::UnknownPredicate`] for unregistered methods.
    pub fn call(&mut self, condition: &Condition) -> Result<Value, PredicateError> {
        let key = condition.memo_key();
        if let Some(value) = self.memo.get(&key) {
            return Ok(value.clone());
        }
        let predicate = self.registry.get(&condition.method)?;
        let value = predicate.call(&condition.argument_list());
        self.calls += 1;
        tracing::trace!(method = %condition.method, %value, "evaluated critical CSS predicate");
        let _ = self.memo.insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_single_object_is_its_own_group() {
        let tree = [json!({"method": "a"}), json!([{"method": "b"}, {"method": "c"}]), json!(1)];
        let groups = or_groups(&tree);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[1].len(), 2);
    }

    #[test]
    fn test_expected_result_comparison() {
        let default = Condition {
            method: "m".to_string(),
            arguments: None,
            result: None,
        };
        assert!(default.accepts(&json!(true)));
        assert!(!default.accepts(&json!(1)));

        let listed = Condition {
            result: Some(json!(["page", "post"])),
            ..default
        };
        assert!(listed.accepts(&json!("post")));
        assert!(!listed.accepts(&json!("product")));
    }

    #[test]
    fn test_memo_key_includes_arguments() {
        let condition = Condition {
            method: "is_page".to_string(),
            arguments: Some(json!(["about"])),
            result: None,
        };
        assert_eq!(condition.memo_key(), r#"is_page:["about"]"#);
        assert_eq!(condition.argument_list(), vec![json!("about")]);
    }
}
