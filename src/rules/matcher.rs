//! Group-level ALL/ANY combinator.

use chrono::{DateTime, Utc};

use crate::rules::evaluator;
use crate::rules::model::{Combinator, MessageRecord, RuleGroup};

/// Whether `group` fires for `record`, as of now.
pub fn matches(group: &RuleGroup, record: &MessageRecord) -> bool {
    matches_at(group, record, Utc::now())
}

/// Whether `group` fires for `record`, as of `now`.
///
/// Every condition is evaluated; conditions are side-effect free, so the
/// result is the same as a short-circuiting walk.
pub fn matches_at(group: &RuleGroup, record: &MessageRecord, now: DateTime<Utc>) -> bool {
    let results: Vec<bool> = group
        .conditions
        .iter()
        .map(|condition| evaluator::evaluate_at(condition, record, now))
        .collect();
    combine(group.combinator, &results)
}

/// Apply a combinator to per-condition results.
pub fn combine(combinator: Combinator, results: &[bool]) -> bool {
    match combinator {
        Combinator::All => results.iter().all(|r| *r),
        Combinator::Any => results.iter().any(|r| *r),
    }
}
