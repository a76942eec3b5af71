//! Conditional critical CSS.
//!
//! # Selection
//!
//! Each configured [`CriticalCssEntry`] names a file in the critical CSS
//! directory, a priority and an optional condition tree:
//! - entries without conditions always apply
//! - a condition tree is a list of OR-groups of AND-ed predicate calls,
//!   resolved through a [`PredicateRegistry`] with per-render memoization
//! - active entries are joined in ascending priority (stable for ties)
//!
//! The result is inlined as `<style data-o10n="critical">`, or linked from
//! the artifact cache when it can be server-pushed.
//!
//! # Editor
//!
//! [`EditorView`] implements the `o10n-css`, `o10n-no-css` and
//! `o10n-full-css` debugging views.

pub mod condition;
pub mod editor;
pub mod entry;
pub mod predicate;
pub mod selector;

pub use condition::{Condition, ConditionEvaluator};
pub use editor::{DeleteStylesheets, EditorView, ViewError, ViewMode, authorize};
pub use entry::{CriticalConfig, CriticalCssEntry};
pub use predicate::{FactPredicate, Predicate, PredicateError, PredicateRegistry};
pub use selector::{CRITICAL_GROUP, CriticalCssSelector, CriticalOutput};
