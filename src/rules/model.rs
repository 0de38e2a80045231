//! Typed rule document, the only shape the engine evaluates.
//!
//! Built exclusively by [`RuleDocument::parse`], which runs the schema
//! validator first. A field/predicate-family mismatch is unrepresentable here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;
use crate::rules::validator;

/// Display name for groups without a `name` key.
pub const UNNAMED_GROUP: &str = "Unnamed Rule";

/// A message as the engine sees it. Owned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
    /// Raw stored timestamp: RFC 3339, naive ISO, or epoch milliseconds.
    pub received: String,
    pub is_read: bool,
    /// Provider label ids.
    pub labels: Vec<String>,
}

/// How a group's condition results combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    All,
    Any,
}

impl Combinator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Combinator::All => "all",
            Combinator::Any => "any",
        }
    }
}

impl FromStr for Combinator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Combinator::All),
            "any" => Ok(Combinator::Any),
            _ => Err(()),
        }
    }
}

/// Text-valued message fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    From,
    Subject,
    Message,
}

impl TextField {
    /// Document spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            TextField::From => "from",
            TextField::Subject => "subject",
            TextField::Message => "message",
        }
    }

    /// Storage column backing this field.
    pub fn column(&self) -> &'static str {
        match self {
            TextField::From => "sender",
            TextField::Subject => "subject",
            TextField::Message => "snippet",
        }
    }

    /// The record value backing this field.
    pub fn value_of<'r>(&self, record: &'r MessageRecord) -> &'r str {
        match self {
            TextField::From => &record.sender,
            TextField::Subject => &record.subject,
            TextField::Message => &record.snippet,
        }
    }
}

/// Every field a condition may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Text(TextField),
    Received,
}

impl Field {
    pub const NAMES: [&'static str; 4] = ["from", "subject", "message", "received"];
}

impl FromStr for Field {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "from" => Ok(Field::Text(TextField::From)),
            "subject" => Ok(Field::Text(TextField::Subject)),
            "message" => Ok(Field::Text(TextField::Message)),
            "received" => Ok(Field::Received),
            _ => Err(()),
        }
    }
}

/// String predicate family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPredicate {
    Contains,
    DoesNotContain,
    Equals,
    DoesNotEqual,
}

/// How a text predicate compares, shared by both evaluation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Substring,
    Exact,
}

impl TextPredicate {
    pub const NAMES: [&'static str; 4] = ["contains", "does_not_contain", "equals", "does_not_equal"];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextPredicate::Contains => "contains",
            TextPredicate::DoesNotContain => "does_not_contain",
            TextPredicate::Equals => "equals",
            TextPredicate::DoesNotEqual => "does_not_equal",
        }
    }

    /// Comparison kind and whether the result is negated.
    pub fn semantics(&self) -> (TextMatch, bool) {
        match self {
            TextPredicate::Contains => (TextMatch::Substring, false),
            TextPredicate::DoesNotContain => (TextMatch::Substring, true),
            TextPredicate::Equals => (TextMatch::Exact, false),
            TextPredicate::DoesNotEqual => (TextMatch::Exact, true),
        }
    }
}

impl FromStr for TextPredicate {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(TextPredicate::Contains),
            "does_not_contain" => Ok(TextPredicate::DoesNotContain),
            "equals" => Ok(TextPredicate::Equals),
            "does_not_equal" => Ok(TextPredicate::DoesNotEqual),
            _ => Err(()),
        }
    }
}

/// Date-offset predicate family for the `received` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePredicate {
    YoungerThanDays,
    OlderThanDays,
    YoungerThanMonths,
    OlderThanMonths,
}

/// Fixed month length. Not calendar months.
pub const DAYS_PER_MONTH: i64 = 30;

/// Bound on a record's whole-day age, shared by both evaluation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBound {
    /// `age_days < n`
    Below(i64),
    /// `age_days > n`
    Above(i64),
}

impl AgeBound {
    pub fn admits(&self, age_days: i64) -> bool {
        match *self {
            AgeBound::Below(n) => age_days < n,
            AgeBound::Above(n) => age_days > n,
        }
    }
}

impl DatePredicate {
    pub const NAMES: [&'static str; 4] = [
        "younger_than_days",
        "older_than_days",
        "younger_than_months",
        "older_than_months",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatePredicate::YoungerThanDays => "younger_than_days",
            DatePredicate::OlderThanDays => "older_than_days",
            DatePredicate::YoungerThanMonths => "younger_than_months",
            DatePredicate::OlderThanMonths => "older_than_months",
        }
    }

    pub fn age_bound(&self, amount: u32) -> AgeBound {
        let amount = i64::from(amount);
        match self {
            DatePredicate::YoungerThanDays => AgeBound::Below(amount),
            DatePredicate::OlderThanDays => AgeBound::Above(amount),
            DatePredicate::YoungerThanMonths => AgeBound::Below(amount * DAYS_PER_MONTH),
            DatePredicate::OlderThanMonths => AgeBound::Above(amount * DAYS_PER_MONTH),
        }
    }
}

impl FromStr for DatePredicate {
    type Err = ();

    /// Accepts the `less_than_*`/`greater_than_*` spellings used by older rule files.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "younger_than_days" | "less_than_days" => Ok(DatePredicate::YoungerThanDays),
            "older_than_days" | "greater_than_days" => Ok(DatePredicate::OlderThanDays),
            "younger_than_months" | "less_than_months" => Ok(DatePredicate::YoungerThanMonths),
            "older_than_months" | "greater_than_months" => Ok(DatePredicate::OlderThanMonths),
            _ => Err(()),
        }
    }
}

/// A single field/predicate/value test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Text {
        field: TextField,
        predicate: TextPredicate,
        value: String,
    },
    Received {
        predicate: DatePredicate,
        amount: u32,
    },
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Text {
                field,
                predicate,
                value,
            } => write!(f, "{} {} '{}'", field.as_str(), predicate.as_str(), value),
            Condition::Received { predicate, amount } => {
                write!(f, "received {} '{}'", predicate.as_str(), amount)
            }
        }
    }
}

/// One side-effecting action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    MarkRead(bool),
    MarkUnread(bool),
    MoveTo(String),
}

/// Action key as written in rule documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    MarkRead,
    MarkUnread,
    MoveTo,
}

impl ActionKind {
    pub const NAMES: [&'static str; 3] = ["mark_as_read", "mark_as_unread", "move_message"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::MarkRead => "mark_as_read",
            ActionKind::MarkUnread => "mark_as_unread",
            ActionKind::MoveTo => "move_message",
        }
    }
}

impl FromStr for ActionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mark_as_read" | "mark_read" => Ok(ActionKind::MarkRead),
            "mark_as_unread" | "mark_unread" => Ok(ActionKind::MarkUnread),
            "move_message" | "move_to" => Ok(ActionKind::MoveTo),
            _ => Err(()),
        }
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::MarkRead(_) => ActionKind::MarkRead,
            Action::MarkUnread(_) => ActionKind::MarkUnread,
            Action::MoveTo(_) => ActionKind::MoveTo,
        }
    }
}

/// Actions of one group, in document order, one per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionMap(Vec<Action>);

impl ActionMap {
    pub fn new(actions: Vec<Action>) -> Self {
        Self(actions)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Conditions plus actions, combined by ALL/ANY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleGroup {
    pub name: Option<String>,
    pub combinator: Combinator,
    pub conditions: Vec<Condition>,
    pub actions: ActionMap,
}

impl RuleGroup {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED_GROUP)
    }
}

/// A validated rule document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDocument {
    pub groups: Vec<RuleGroup>,
}

impl RuleDocument {
    /// Validate a raw JSON document and build its typed form.
    ///
    /// Returns the validator's warnings alongside the document.
    pub fn parse(raw: &Value) -> Result<(Self, Vec<String>), SchemaError> {
        let report = validator::validate(raw);
        if !report.is_valid() {
            return Err(match raw {
                Value::Array(_) => SchemaError::Invalid {
                    errors: report.errors,
                },
                _ => SchemaError::NotAnArray,
            });
        }

        let groups = raw
            .as_array()
            .map(|groups| groups.iter().filter_map(typed_group).collect())
            .unwrap_or_default();

        Ok((Self { groups }, report.warnings))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

// The builders below run only on validated input; `None` is unreachable there.

fn typed_group(raw: &Value) -> Option<RuleGroup> {
    let name = raw.get("name").and_then(Value::as_str).map(String::from);
    let combinator = raw.get("predicate")?.as_str()?.parse().ok()?;
    let conditions = raw
        .get("conditions")?
        .as_array()?
        .iter()
        .map(typed_condition)
        .collect::<Option<Vec<_>>>()?;
    let actions = raw
        .get("actions")?
        .as_object()?
        .iter()
        .map(|(key, value)| typed_action(key, value))
        .collect::<Option<Vec<_>>>()?;

    Some(RuleGroup {
        name,
        combinator,
        conditions,
        actions: ActionMap::new(actions),
    })
}

fn typed_condition(raw: &Value) -> Option<Condition> {
    let field: Field = raw.get("field")?.as_str()?.parse().ok()?;
    let predicate = raw.get("predicate")?.as_str()?;
    let value = raw.get("value")?.as_str()?;

    match field {
        Field::Text(field) => Some(Condition::Text {
            field,
            predicate: predicate.parse().ok()?,
            value: value.to_string(),
        }),
        Field::Received => Some(Condition::Received {
            predicate: predicate.parse().ok()?,
            amount: value.trim().parse().ok()?,
        }),
    }
}

fn typed_action(key: &str, value: &Value) -> Option<Action> {
    match key.parse().ok()? {
        ActionKind::MarkRead => Some(Action::MarkRead(value.as_bool()?)),
        ActionKind::MarkUnread => Some(Action::MarkUnread(value.as_bool()?)),
        ActionKind::MoveTo => Some(Action::MoveTo(value.as_str()?.to_string())),
    }
}
