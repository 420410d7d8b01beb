use std::fmt;
use std::sync::Arc;

use gatehouse_core_types::{Context, User};

use crate::errors::{RuleError, RuleFailure};

/// A named access-control transform.
///
/// Returning `Ok(None)` denies or drops the item and halts the rest of the chain.
pub trait Rule<T>: Send + Sync {
    fn apply(&self, item: T, user: &User, context: &Context) -> Result<Option<T>, RuleFailure>;
}

pub type RuleFn<T> = Arc<dyn Fn(T) -> T + Send + Sync>;
pub type RulePredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// One of the three ways a rule can be supplied: a full rule, a plain
/// transform, or a keep/drop predicate.
pub enum WrappedRule<T> {
    Rule(Arc<dyn Rule<T>>),
    Function(RuleFn<T>),
    Predicate(RulePredicate<T>),
}

impl<T> WrappedRule<T> {
    /// Builds a wrapped rule from optional parts, exactly one of which must be present.
    pub fn from_parts(
        rule: Option<Arc<dyn Rule<T>>>,
        function: Option<RuleFn<T>>,
        predicate: Option<RulePredicate<T>>,
    ) -> Result<Self, RuleError> {
        match (rule, function, predicate) {
            (Some(rule), None, None) => Ok(WrappedRule::Rule(rule)),
            (None, Some(function), None) => Ok(WrappedRule::Function(function)),
            (None, None, Some(predicate)) => Ok(WrappedRule::Predicate(predicate)),
            (None, None, None) => Err(RuleError::InvalidRule(
                "wrapped rule needs one of rule, function or predicate".into(),
            )),
            _ => Err(RuleError::InvalidRule(
                "wrapped rule accepts only one of rule, function or predicate".into(),
            )),
        }
    }

    fn variant(&self) -> &'static str {
        match self {
            WrappedRule::Rule(_) => "rule",
            WrappedRule::Function(_) => "function",
            WrappedRule::Predicate(_) => "predicate",
        }
    }
}

impl<T> Clone for WrappedRule<T> {
    fn clone(&self) -> Self {
        match self {
            WrappedRule::Rule(rule) => WrappedRule::Rule(Arc::clone(rule)),
            WrappedRule::Function(function) => WrappedRule::Function(Arc::clone(function)),
            WrappedRule::Predicate(predicate) => WrappedRule::Predicate(Arc::clone(predicate)),
        }
    }
}

impl<T> fmt::Debug for WrappedRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WrappedRule").field(&self.variant()).finish()
    }
}

impl<T: Send + Sync> Rule<T> for WrappedRule<T> {
    fn apply(&self, item: T, user: &User, context: &Context) -> Result<Option<T>, RuleFailure> {
        match self {
            WrappedRule::Rule(rule) => rule.apply(item, user, context),
            WrappedRule::Function(function) => Ok(Some(function(item))),
            WrappedRule::Predicate(predicate) => {
                if predicate(&item) {
                    Ok(Some(item))
                } else {
                    Ok(None)
                }
            }
        }
    }
}
