//! Named predicates referenced by critical CSS conditions.
//!
//! A condition names a predicate by `method` and compares its return value
//! with an expected result. The host registers the predicates it supports;
//! [`FactPredicate`] answers from static JSON facts when there is no host.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Errors raised while resolving a condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredicateError {
    /// No predicate is registered under the condition's method name.
    #[error("critical CSS condition method does not exist: {0}")]
    UnknownPredicate(String),
    /// The condition is not a `{method, arguments?, result?}` object.
    #[error("malformed critical CSS condition: {0}")]
    MalformedCondition(String),
}

/// A callable condition predicate.
///
/// Calls are assumed to be pure for the duration of one evaluation pass;
/// results are memoized per `(method, arguments)`.
pub trait Predicate {
    /// Evaluate with positional arguments.
    fn call(&self, arguments: &[Value]) -> Value;
}

impl<F> Predicate for F
where
    F: Fn(&[Value]) -> Value,
{
    fn call(&self, arguments: &[Value]) -> Value {
        self(arguments)
    }
}

/// A predicate answering from a JSON fact.
///
/// Without arguments the fact itself is returned. With arguments, an
/// object fact is indexed by the first argument and a list fact tests
/// membership of it; missing entries answer `false`.
#[derive(Debug, Clone, PartialEq)]
pub struct FactPredicate(pub Value);

impl Predicate for FactPredicate {
    fn call(&self, arguments: &[Value]) -> Value {
        let Some(first) = arguments.first() else {
            return self.0.clone();
        };
        match (&self.0, first) {
            (Value::Object(map), Value::String(key)) => {
                map.get(key).cloned().unwrap_or(Value::Bool(false))
            }
            (Value::Array(items), arg) => Value::Bool(items.contains(arg)),
            (fact, _) => fact.clone(),
        }
    }
}

/// Predicates available to condition trees, by method name.
#[derive(Default)]
pub struct PredicateRegistry {
    predicates: HashMap<String, Box<dyn Predicate>>,
}

impl PredicateRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry answering every key of `facts` with a [`FactPredicate`].
    #[must_use]
    pub fn from_facts(facts: &Map<String, Value>) -> Self {
        let mut registry = Self::new();
        for (name, fact) in facts {
            registry.register(name, FactPredicate(fact.clone()));
        }
        registry
    }

    /// Register (or replace) the predicate called `name`.
    pub fn register(&mut self, name: impl Into<String>, predicate: impl Predicate + 'static) {
        let _ = self.predicates.insert(name.into(), Box::new(predicate));
    }

    /// Look up a predicate.
    ///
    /// # Errors
    ///
    /// Returns [`PredicateError::UnknownPredicate`] when nothing is
    /// registered under `name`.
    pub fn get(&self, name: &str) -> Result<&dyn Predicate, PredicateError> {
        self.predicates
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| PredicateError::UnknownPredicate(name.to_string()))
    }

    /// Number of registered predicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_fact_predicate_lookups() {
        let page = FactPredicate(json!({"about": true}));
        assert_eq!(page.call(&[]), json!({"about": true}));
        assert_eq!(page.call(&[json!("about")]), json!(true));
        assert_eq!(page.call(&[json!("contact")]), json!(false));

        let types = FactPredicate(json!(["page", "post"]));
        assert_eq!(types.call(&[json!("post")]), json!(true));
        assert_eq!(types.call(&[json!("product")]), json!(false));
    }

    #[test]
    fn test_unknown_predicate() {
        let registry = PredicateRegistry::new();
        assert_eq!(
            registry.get("is_home").err(),
            Some(PredicateError::UnknownPredicate("is_home".to_string()))
        );
    }
}
