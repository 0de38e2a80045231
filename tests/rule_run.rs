//! End-to-end rule runs against an in-memory store and a stub provider.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use mail_rules::error::ProviderError;
use mail_rules::mailbox::Mailbox;
use mail_rules::provider::MailProvider;
use mail_rules::rules::dispatcher;
use mail_rules::rules::model::{Action, ActionMap};
use mail_rules::rules::{MatchStrategy, MessageRecord, RuleRunner, RunState};
use mail_rules::store::{Label, LibSqlBackend, MessageStore};

/// Stub provider that logs every mutation (no network).
#[derive(Default)]
struct StubProvider {
    calls: Mutex<Vec<String>>,
    created: Mutex<Vec<Label>>,
}

impl StubProvider {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailProvider for StubProvider {
    async fn list_message_ids(
        &self,
        _after: DateTime<Utc>,
        _before: DateTime<Utc>,
        _max_results: u32,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }

    async fn get_message(&self, id: &str) -> Result<MessageRecord, ProviderError> {
        Err(ProviderError::InvalidResponse {
            endpoint: "messages.get".into(),
            reason: format!("stub has no message {id}"),
        })
    }

    async fn mark_read(&self, id: &str) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(format!("mark_read {id}"));
        Ok(())
    }

    async fn mark_unread(&self, id: &str) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(format!("mark_unread {id}"));
        Ok(())
    }

    async fn modify_labels(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("modify {id} add={add:?} remove={remove:?}"));
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<Label>, ProviderError> {
        Ok(self.created.lock().unwrap().clone())
    }

    async fn create_label(&self, name: &str) -> Result<Label, ProviderError> {
        self.calls.lock().unwrap().push(format!("create_label {name}"));
        let label = Label {
            id: "Label_42".into(),
            name: name.into(),
        };
        self.created.lock().unwrap().push(label.clone());
        Ok(label)
    }
}

fn record(id: &str, sender: &str, subject: &str, received: String) -> MessageRecord {
    MessageRecord {
        id: id.into(),
        sender: sender.into(),
        subject: subject.into(),
        snippet: String::new(),
        received,
        is_read: false,
        labels: vec!["INBOX".into(), "UNREAD".into(), "CATEGORY_UPDATES".into()],
    }
}

fn trakstar_rules() -> Value {
    json!([{
        "name": "Trakstar assignments",
        "predicate": "all",
        "conditions": [
            {"field": "from", "predicate": "contains", "value": "trakstar.com"},
            {"field": "subject", "predicate": "contains", "value": "assignment"},
            {"field": "received", "predicate": "younger_than_days", "value": "2"}
        ],
        "actions": {"move_message": "processed", "mark_as_read": true}
    }])
}

async fn setup(records: &[MessageRecord]) -> (Arc<StubProvider>, Arc<LibSqlBackend>, Arc<Mailbox>) {
    let provider = Arc::new(StubProvider::default());
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    store.insert_messages(records).await.unwrap();
    let mailbox = Arc::new(Mailbox::new(provider.clone(), store.clone()));
    (provider, store, mailbox)
}

fn scenario_records() -> Vec<MessageRecord> {
    let now = Utc::now();
    vec![
        record(
            "match",
            "Trakstar <alerts@trakstar.com>",
            "New Assignment available",
            (now - Duration::hours(5)).to_rfc3339(),
        ),
        record(
            "other-sender",
            "news@example.com",
            "New assignment available",
            (now - Duration::hours(5)).to_rfc3339(),
        ),
        record(
            "too-old",
            "alerts@trakstar.com",
            "Assignment reminder",
            (now - Duration::days(10)).to_rfc3339(),
        ),
    ]
}

#[tokio::test]
async fn trakstar_rule_fires_once_for_matching_record() {
    for strategy in [MatchStrategy::InMemory, MatchStrategy::Pushdown] {
        let (provider, store, mailbox) = setup(&scenario_records()).await;
        let mut runner = RuleRunner::new(store.clone(), mailbox, strategy);

        let summary = runner.run_value(&trakstar_rules()).await.unwrap();

        assert_eq!(runner.state(), RunState::Done);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.matched_per_group[0].matched, 1, "{strategy:?}");
        assert_eq!(summary.actions_attempted, 2);
        assert_eq!(summary.actions_failed, 0);
        assert_eq!(
            provider.calls(),
            vec![
                "create_label processed".to_string(),
                r#"modify match add=["Label_42"] remove=["INBOX", "CATEGORY_UPDATES"]"#.to_string(),
                "mark_read match".to_string(),
            ],
            "{strategy:?}"
        );

        let matched = store.get_record("match").await.unwrap().unwrap();
        assert!(matched.is_read);
        assert_eq!(matched.labels, vec!["UNREAD", "Label_42"]);

        for untouched in ["other-sender", "too-old"] {
            let record = store.get_record(untouched).await.unwrap().unwrap();
            assert!(!record.is_read, "{untouched}");
            assert!(record.labels.contains(&"INBOX".to_string()), "{untouched}");
        }
    }
}

#[tokio::test]
async fn rerunning_is_idempotent() {
    let (provider, store, mailbox) = setup(&scenario_records()).await;
    let mut runner = RuleRunner::new(store.clone(), mailbox, MatchStrategy::InMemory);

    runner.run_value(&trakstar_rules()).await.unwrap();
    let summary = runner.run_value(&trakstar_rules()).await.unwrap();

    assert_eq!(summary.matched_per_group[0].matched, 1);
    let calls = provider.calls();
    assert_eq!(calls.iter().filter(|c| c.starts_with("create_label")).count(), 1);
    assert_eq!(calls.iter().filter(|c| c.starts_with("modify")).count(), 1);
    assert_eq!(calls.iter().filter(|c| c.starts_with("mark_read")).count(), 2);
    assert!(store.get_record("match").await.unwrap().unwrap().is_read);
}

#[tokio::test]
async fn malformed_timestamp_does_not_block_other_records() {
    let mut records = scenario_records();
    records.insert(
        0,
        record(
            "garbled",
            "alerts@trakstar.com",
            "Assignment posted",
            "sometime last week".into(),
        ),
    );

    for strategy in [MatchStrategy::InMemory, MatchStrategy::Pushdown] {
        let (provider, store, mailbox) = setup(&records).await;
        let mut runner = RuleRunner::new(store, mailbox, strategy);

        let summary = runner.run_value(&trakstar_rules()).await.unwrap();

        assert_eq!(summary.processed, 4);
        assert_eq!(summary.matched_per_group[0].matched, 1, "{strategy:?}");
        assert!(provider.calls().iter().all(|c| !c.contains("garbled")));
        assert!(provider.calls().contains(&"mark_read match".to_string()));
    }
}

#[tokio::test]
async fn store_failure_is_reported_per_action() {
    // Never inserted, so every store write after the provider call is NotFound.
    let (provider, _, mailbox) = setup(&[]).await;
    let actions = ActionMap::new(vec![Action::MarkRead(true), Action::MarkUnread(true)]);
    let mut labels = vec!["INBOX".to_string()];

    let outcomes = dispatcher::dispatch(mailbox.as_ref(), "ghost", "assignment", &actions, &mut labels).await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_failure()));
    assert_eq!(provider.calls(), vec!["mark_read ghost", "mark_unread ghost"]);
}
