//! Rule engine: validation, evaluation, matching and dispatch.

pub mod compiler;
pub mod dispatcher;
pub mod evaluator;
pub mod matcher;
pub mod model;
pub mod runner;
pub mod validator;

pub use compiler::SqlPredicate;
pub use model::{MessageRecord, RuleDocument, RuleGroup};
pub use runner::{GroupTally, MatchStrategy, RuleRunner, RunState, RunSummary, load_rules};
pub use validator::{ValidationReport, validate};
