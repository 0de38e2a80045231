//! In-memory condition evaluation over an already-fetched record.
//!
//! Must agree with [`crate::rules::compiler`] on every input; both read their
//! semantics from [`TextPredicate::semantics`] and [`DatePredicate::age_bound`].
//!
//! [`TextPredicate::semantics`]: crate::rules::model::TextPredicate::semantics
//! [`DatePredicate::age_bound`]: crate::rules::model::DatePredicate::age_bound

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use tracing::debug;

use crate::error::EvaluationError;
use crate::rules::model::{Condition, MessageRecord, TextMatch};

const MS_PER_DAY: i64 = 86_400_000;

/// UTC with millisecond precision, as SQLite's `strftime('%Y-%m-%dT%H:%M:%fZ')` prints it.
const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Naive ISO layouts, read as UTC.
const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Evaluate one condition against one record, as of now.
pub fn evaluate(condition: &Condition, record: &MessageRecord) -> bool {
    evaluate_at(condition, record, Utc::now())
}

/// Evaluate one condition against one record, as of `now`.
///
/// Bad record data makes the condition false; it never propagates.
pub fn evaluate_at(condition: &Condition, record: &MessageRecord, now: DateTime<Utc>) -> bool {
    match try_evaluate_at(condition, record, now) {
        Ok(matched) => matched,
        Err(e) => {
            debug!(id = %record.id, condition = %condition, error = %e, "Condition evaluated to false");
            false
        }
    }
}

fn try_evaluate_at(
    condition: &Condition,
    record: &MessageRecord,
    now: DateTime<Utc>,
) -> Result<bool, EvaluationError> {
    match condition {
        Condition::Text {
            field,
            predicate,
            value,
        } => {
            let haystack = field.value_of(record).to_ascii_lowercase();
            let needle = value.to_ascii_lowercase();
            let (kind, negated) = predicate.semantics();
            let hit = match kind {
                TextMatch::Substring => haystack.contains(&needle),
                TextMatch::Exact => haystack == needle,
            };
            Ok(hit != negated)
        }
        Condition::Received { predicate, amount } => {
            let received = parse_received(&record.received)?;
            Ok(predicate.age_bound(*amount).admits(age_days(received, now)))
        }
    }
}

/// Whole days elapsed from `received` to `now`, floored.
pub fn age_days(received: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(received)
        .num_milliseconds()
        .div_euclid(MS_PER_DAY)
}

/// Parse a stored `received` value.
///
/// Tries RFC 3339, then naive ISO forms as UTC, then all-digit epoch
/// milliseconds. The result is truncated to whole milliseconds and must fall
/// in years 0000 through 9999, the range SQLite's date functions cover.
pub fn parse_received(raw: &str) -> Result<DateTime<Utc>, EvaluationError> {
    parse_any(raw)
        .and_then(|dt| DateTime::from_timestamp_millis(dt.timestamp_millis()))
        .filter(|dt| (0..=9999).contains(&dt.year()))
        .ok_or_else(|| EvaluationError::BadTimestamp(raw.to_string()))
}

/// The form the store keeps in `received_at`, or `None` if `raw` doesn't parse.
pub fn canonical_received(raw: &str) -> Option<String> {
    parse_received(raw)
        .ok()
        .map(|dt| dt.format(CANONICAL_FORMAT).to_string())
}

fn parse_any(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ndt.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse().ok().and_then(DateTime::from_timestamp_millis);
    }
    None
}
