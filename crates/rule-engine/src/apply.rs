use gatehouse_core_types::{Context, User};
use tracing::debug;

use crate::errors::RuleError;
use crate::model::{RuleKind, RuleSet};
use crate::registry::CompiledRules;

/// Runs `item` through `rules` in declaration order.
///
/// Absent or empty rules are the identity. The first rule that yields `None`
/// ends the chain and the whole result is `None`.
pub fn apply_rules<T>(
    item: T,
    user: &User,
    context: &Context,
    rules: Option<&CompiledRules<T>>,
) -> Result<Option<T>, RuleError> {
    let Some(rules) = rules else {
        return Ok(Some(item));
    };

    let mut current = item;
    for (rule_id, rule) in rules.iter() {
        match rule.apply(current, user, context) {
            Ok(Some(next)) => current = next,
            Ok(None) => {
                debug!(rule_id, "rule dropped item");
                return Ok(None);
            }
            Err(failure) => {
                return Err(RuleError::Apply {
                    rule_id: rule_id.to_string(),
                    reason: failure.to_string(),
                })
            }
        }
    }
    Ok(Some(current))
}

/// Combines an ancestor's rule set with a descendant's.
///
/// Messages are joined with `,` skipping the "no rules set" sentinel and empty
/// messages. Two message-less sides merge to an empty message. On a rule id
/// collision the descendant's rule wins and keeps the ancestor's position.
pub fn merge_rules<K: RuleKind>(inherited: &RuleSet<K>, new: &RuleSet<K>) -> RuleSet<K> {
    debug!(kind = K::LABEL, inherited = ?inherited, new = ?new, "merging rule sets");

    let message = match (inherited.has_message(), new.has_message()) {
        (true, true) => format!("{},{}", inherited.message, new.message),
        (true, false) => inherited.message.clone(),
        (false, true) => new.message.clone(),
        (false, false) => String::new(),
    };

    let mut merged = RuleSet::<K>::new().with_message(message);
    merged.add_rules(&inherited.rules).add_rules(&new.rules);

    debug!(kind = K::LABEL, merged = ?merged, "merged rule sets");
    merged
}

/// Folds `merge_rules` over rule sets ordered root first.
pub fn merge_hierarchy<'a, K, I>(root_to_leaf: I) -> Option<RuleSet<K>>
where
    K: RuleKind,
    I: IntoIterator<Item = &'a RuleSet<K>>,
{
    let mut levels = root_to_leaf.into_iter();
    let first = levels.next()?.clone();
    Some(levels.fold(first, |acc, next| merge_rules(&acc, next)))
}
