//! Predicate compiler: translates conditions into a SQLite `WHERE` fragment.
//!
//! The fragment is the storage-side twin of [`crate::rules::evaluator`]: for
//! every record and condition both must return the same boolean. Date
//! cutoffs are bound as `julianday('now', ?)` modifiers, so a compiled
//! fragment stays correct however long it is reused.

use crate::rules::model::{AgeBound, Combinator, Condition, TextMatch};

/// Julian day of a record's receipt time.
///
/// `received_at` holds the canonical form written by the store at insert, or
/// NULL when `received` does not parse; NULL fails every comparison.
const RECEIVED_JULIAN_DAY: &str = "julianday(received_at)";

/// Matches nothing.
const ALWAYS_FALSE: &str = "0";

/// A SQL boolean expression with positional `?` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlPredicate {
    pub sql: String,
    pub params: Vec<String>,
}

impl SqlPredicate {
    fn never() -> Self {
        Self {
            sql: ALWAYS_FALSE.to_string(),
            params: Vec::new(),
        }
    }
}

/// Compile a group's conditions, joined by its combinator.
///
/// An empty list compiles to a fragment that matches nothing.
pub fn compile(conditions: &[Condition], combinator: Combinator) -> SqlPredicate {
    if conditions.is_empty() {
        return SqlPredicate::never();
    }

    let joiner = match combinator {
        Combinator::All => " AND ",
        Combinator::Any => " OR ",
    };

    let mut parts = Vec::with_capacity(conditions.len());
    let mut params = Vec::new();
    for condition in conditions {
        let fragment = compile_condition(condition);
        parts.push(format!("({})", fragment.sql));
        params.extend(fragment.params);
    }

    SqlPredicate {
        sql: parts.join(joiner),
        params,
    }
}

/// Compile a single condition.
pub fn compile_condition(condition: &Condition) -> SqlPredicate {
    match condition {
        Condition::Text {
            field,
            predicate,
            value,
        } => {
            let column = field.column();
            let value = value.to_ascii_lowercase();
            let (kind, negated) = predicate.semantics();
            let (sql, param) = match (kind, negated) {
                (TextMatch::Substring, false) => (
                    format!("LOWER({column}) LIKE ? ESCAPE '\\'"),
                    like_pattern(&value),
                ),
                (TextMatch::Substring, true) => (
                    format!("LOWER({column}) NOT LIKE ? ESCAPE '\\'"),
                    like_pattern(&value),
                ),
                (TextMatch::Exact, false) => (format!("LOWER({column}) = ?"), value),
                (TextMatch::Exact, true) => (format!("LOWER({column}) != ?"), value),
            };
            SqlPredicate {
                sql,
                params: vec![param],
            }
        }
        Condition::Received { predicate, amount } => {
            let (sql, days_back) = match predicate.age_bound(*amount) {
                AgeBound::Below(days) => (
                    format!("({RECEIVED_JULIAN_DAY}) > julianday('now', ?)"),
                    days,
                ),
                // Whole-day age must exceed `days`, so the cutoff sits a full day further back.
                AgeBound::Above(days) => (
                    format!("({RECEIVED_JULIAN_DAY}) <= julianday('now', ?)"),
                    days + 1,
                ),
            };
            SqlPredicate {
                sql,
                params: vec![format!("-{days_back} days")],
            }
        }
    }
}

/// `%value%` with LIKE metacharacters escaped by `\`.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
