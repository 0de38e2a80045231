//! Rule runner: load, validate, match, dispatch.
//!
//! The only part of the engine with side effects, all of which go through
//! the injected store and mailbox. Load and validation failures abort the run
//! before any record is touched; anything after that is isolated to the
//! record or group it happened in.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RunnerError;
use crate::mailbox::MailboxActions;
use crate::rules::compiler;
use crate::rules::dispatcher::{self, ActionOutcome};
use crate::rules::matcher;
use crate::rules::model::{MessageRecord, RuleDocument, RuleGroup};
use crate::store::MessageStore;

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Loading,
    Validating,
    Running,
    Done,
    Failed,
}

/// How records are matched against groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStrategy {
    /// Fetch every record and evaluate conditions in process.
    #[default]
    InMemory,
    /// Compile each group to SQL and let the store filter.
    Pushdown,
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_memory" => Ok(MatchStrategy::InMemory),
            "pushdown" => Ok(MatchStrategy::Pushdown),
            other => Err(format!("expected 'in_memory' or 'pushdown', got '{other}'")),
        }
    }
}

/// How many records one group fired for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTally {
    pub name: String,
    pub matched: usize,
}

/// Counts reported when a run finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub matched_per_group: Vec<GroupTally>,
    pub actions_attempted: usize,
    pub actions_failed: usize,
}

impl RunSummary {
    fn for_document(document: &RuleDocument) -> Self {
        Self {
            matched_per_group: document
                .groups
                .iter()
                .map(|group| GroupTally {
                    name: group.display_name().to_string(),
                    matched: 0,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn record_outcomes(&mut self, outcomes: &[ActionOutcome]) {
        self.actions_attempted += outcomes.iter().filter(|o| o.was_attempted()).count();
        self.actions_failed += outcomes.iter().filter(|o| o.is_failure()).count();
    }
}

/// Read, parse, and validate a rule document from disk.
pub async fn load_rules(path: &Path) -> Result<RuleDocument, RunnerError> {
    validate_rules(&read_rules(path).await?)
}

async fn read_rules(path: &Path) -> Result<Value, RunnerError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RunnerError::RulesNotFound(path.to_path_buf())
        } else {
            RunnerError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;
    Ok(serde_json::from_str(&raw)?)
}

fn validate_rules(value: &Value) -> Result<RuleDocument, RunnerError> {
    let (document, warnings) = RuleDocument::parse(value)?;
    for warning in warnings {
        warn!(warning = %warning, "Rule document warning");
    }
    Ok(document)
}

/// Drives one rule run against a store and mailbox.
pub struct RuleRunner {
    store: Arc<dyn MessageStore>,
    mailbox: Arc<dyn MailboxActions>,
    strategy: MatchStrategy,
    state: RunState,
}

impl RuleRunner {
    pub fn new(
        store: Arc<dyn MessageStore>,
        mailbox: Arc<dyn MailboxActions>,
        strategy: MatchStrategy,
    ) -> Self {
        Self {
            store,
            mailbox,
            strategy,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Load the rule file at `path` and apply it to every stored record.
    pub async fn run(&mut self, path: &Path) -> Result<RunSummary, RunnerError> {
        self.state = RunState::Loading;
        match read_rules(path).await {
            Ok(value) => self.run_value(&value).await,
            Err(e) => self.fail(e),
        }
    }

    /// Validate an already-parsed document and apply it.
    pub async fn run_value(&mut self, value: &Value) -> Result<RunSummary, RunnerError> {
        self.state = RunState::Validating;
        let document = match validate_rules(value) {
            Ok(document) => document,
            Err(e) => return self.fail(e),
        };

        self.state = RunState::Running;
        info!(
            groups = document.len(),
            strategy = ?self.strategy,
            "Applying rules"
        );
        let result = match self.strategy {
            MatchStrategy::InMemory => self.run_in_memory(&document).await,
            MatchStrategy::Pushdown => self.run_pushdown(&document).await,
        };

        match result {
            Ok(summary) => {
                self.state = RunState::Done;
                info!(
                    processed = summary.processed,
                    attempted = summary.actions_attempted,
                    failed = summary.actions_failed,
                    "Rule run complete"
                );
                Ok(summary)
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: RunnerError) -> Result<RunSummary, RunnerError> {
        self.state = RunState::Failed;
        warn!(error = %error, "Rule run aborted");
        Err(error)
    }

    async fn run_in_memory(&self, document: &RuleDocument) -> Result<RunSummary, RunnerError> {
        let records = self.store.fetch_all_records().await?;
        let mut summary = RunSummary::for_document(document);
        summary.processed = records.len();

        for record in &records {
            let mut labels = record.labels.clone();
            for (index, group) in document.groups.iter().enumerate() {
                if !matcher::matches(group, record) {
                    continue;
                }
                summary.matched_per_group[index].matched += 1;
                self.fire(group, record, &mut labels, &mut summary).await;
            }
        }

        Ok(summary)
    }

    async fn run_pushdown(&self, document: &RuleDocument) -> Result<RunSummary, RunnerError> {
        let mut summary = RunSummary::for_document(document);
        summary.processed = self.store.message_count().await?;

        for (index, group) in document.groups.iter().enumerate() {
            let predicate = compiler::compile(&group.conditions, group.combinator);
            debug!(group = %group.display_name(), sql = %predicate.sql, "Compiled group predicate");

            let records = match self.store.filter_records(&predicate).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(group = %group.display_name(), error = %e, "Group query failed, skipping");
                    continue;
                }
            };

            summary.matched_per_group[index].matched = records.len();
            for record in &records {
                let mut labels = record.labels.clone();
                self.fire(group, record, &mut labels, &mut summary).await;
            }
        }

        Ok(summary)
    }

    async fn fire(
        &self,
        group: &RuleGroup,
        record: &MessageRecord,
        labels: &mut Vec<String>,
        summary: &mut RunSummary,
    ) {
        debug!(id = %record.id, group = %group.display_name(), "Rule group matched");
        let outcomes = dispatcher::dispatch(
            self.mailbox.as_ref(),
            &record.id,
            &record.subject,
            &group.actions,
            labels,
        )
        .await;
        summary.record_outcomes(&outcomes);
    }
}
