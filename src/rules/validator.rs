//! Schema validation for raw rule documents.
//!
//! Collects every violation across all groups, conditions, and actions so a
//! user can fix a whole document in one pass.

use serde_json::{Map, Value};

use crate::rules::model::{ActionKind, Combinator, DatePredicate, Field, TextPredicate};

/// Keys every rule group must carry.
const REQUIRED_GROUP_KEYS: [&str; 3] = ["predicate", "conditions", "actions"];

/// Outcome of validating a rule document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a raw rule document against the fixed grammar.
pub fn validate(document: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();

    let Some(groups) = document.as_array() else {
        report
            .errors
            .push("Rules must be a list of rule objects".to_string());
        return report;
    };

    if groups.is_empty() {
        report.warnings.push("No rules defined".to_string());
        return report;
    }

    for (index, group) in groups.iter().enumerate() {
        report.errors.extend(validate_group(group, index));
    }
    report
}

fn validate_group(group: &Value, index: usize) -> Vec<String> {
    let Some(group) = group.as_object() else {
        return vec![format!("Rule group {index}: Must be an object")];
    };

    let mut errors: Vec<String> = REQUIRED_GROUP_KEYS
        .iter()
        .filter(|key| !group.contains_key(**key))
        .map(|key| format!("Rule group {index}: Missing required field '{key}'"))
        .collect();
    if !errors.is_empty() {
        return errors;
    }

    match group.get("name") {
        None | Some(Value::String(_)) => {}
        Some(_) => errors.push(format!("Rule group {index}: 'name' must be a string")),
    }

    let combinator = &group["predicate"];
    if combinator
        .as_str()
        .and_then(|s| s.parse::<Combinator>().ok())
        .is_none()
    {
        errors.push(format!(
            "Rule group {index}: Invalid predicate {combinator}. Must be one of: all, any"
        ));
    }

    match group["conditions"].as_array() {
        Some(conditions) if conditions.is_empty() => {
            errors.push(format!(
                "Rule group {index}: 'conditions' must contain at least one condition"
            ));
        }
        Some(conditions) => {
            for (position, condition) in conditions.iter().enumerate() {
                errors.extend(validate_condition(condition, index, position));
            }
        }
        None => errors.push(format!("Rule group {index}: 'conditions' must be a list")),
    }

    match group["actions"].as_object() {
        Some(actions) => errors.extend(validate_actions(actions, index)),
        None => errors.push(format!("Rule group {index}: 'actions' must be an object")),
    }

    errors
}

fn validate_condition(condition: &Value, group: usize, position: usize) -> Vec<String> {
    let prefix = format!("Rule group {group}, condition {position}");
    let Some(condition) = condition.as_object() else {
        return vec![format!("{prefix}: Must be an object")];
    };

    let mut errors = Vec::new();

    let field = match condition.get("field").and_then(Value::as_str) {
        None | Some("") => {
            errors.push(format!("{prefix}: Missing required field 'field'"));
            None
        }
        Some(name) => match name.parse::<Field>() {
            Ok(field) => Some(field),
            Err(()) => {
                errors.push(format!(
                    "{prefix}: Invalid field '{name}'. Must be one of: {}",
                    Field::NAMES.join(", ")
                ));
                None
            }
        },
    };

    match condition.get("predicate").and_then(Value::as_str) {
        None | Some("") => errors.push(format!("{prefix}: Missing required field 'predicate'")),
        Some(predicate) => match field {
            Some(Field::Received) if predicate.parse::<DatePredicate>().is_err() => {
                errors.push(format!(
                    "{prefix}: Invalid date predicate '{predicate}'. Must be one of: {}",
                    DatePredicate::NAMES.join(", ")
                ));
            }
            Some(Field::Text(_)) if predicate.parse::<TextPredicate>().is_err() => {
                errors.push(format!(
                    "{prefix}: Invalid string predicate '{predicate}'. Must be one of: {}",
                    TextPredicate::NAMES.join(", ")
                ));
            }
            _ => {}
        },
    }

    match condition.get("value") {
        None => errors.push(format!("{prefix}: Value cannot be empty")),
        Some(Value::String(value)) if value.is_empty() => {
            errors.push(format!("{prefix}: Value cannot be empty"));
        }
        Some(Value::String(value)) => {
            if field == Some(Field::Received) {
                if let Some(error) = check_day_count(value) {
                    errors.push(format!("{prefix}: {error}"));
                }
            }
        }
        Some(_) => errors.push(format!("{prefix}: Value must be a string")),
    }

    errors
}

fn check_day_count(value: &str) -> Option<&'static str> {
    match value.trim().parse::<i64>() {
        Err(_) => Some("Date value must be a valid integer"),
        Ok(n) if n < 0 => Some("Date value must be non-negative"),
        Ok(n) if u32::try_from(n).is_err() => Some("Date value is too large"),
        Ok(_) => None,
    }
}

fn validate_actions(actions: &Map<String, Value>, group: usize) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = Vec::new();

    for (key, value) in actions {
        let Ok(kind) = key.parse::<ActionKind>() else {
            errors.push(format!(
                "Rule group {group}: Invalid action key '{key}'. Must be one of: {}",
                ActionKind::NAMES.join(", ")
            ));
            continue;
        };

        if seen.contains(&kind) {
            errors.push(format!(
                "Rule group {group}: Action '{}' is given more than once",
                kind.as_str()
            ));
        }
        seen.push(kind);

        match kind {
            ActionKind::MarkRead | ActionKind::MarkUnread if !value.is_boolean() => {
                errors.push(format!(
                    "Rule group {group}: Action '{key}' must be a boolean value"
                ));
            }
            ActionKind::MoveTo if value.as_str().is_none_or(str::is_empty) => {
                errors.push(format!(
                    "Rule group {group}: Action '{key}' must be a non-empty string"
                ));
            }
            _ => {}
        }
    }

    errors
}
