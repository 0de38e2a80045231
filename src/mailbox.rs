//! Mailbox facade. Writes every mutation through to the provider, then the store.
//!
//! This is the surface the action dispatcher drives. Provider and store are
//! not updated atomically; each step is safe to repeat, so a retry converges.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{self, ActionError};
use crate::provider::MailProvider;
use crate::rules::model::ActionKind;
use crate::store::MessageStore;

/// System labels a move leaves in place.
pub const SYSTEM_LABELS: [&str; 8] = [
    "CHAT",
    "UNREAD",
    "DRAFT",
    "IMPORTANT",
    "STARRED",
    "TRASH",
    "SPAM",
    "SENT",
];

/// Mutations a fired rule group may perform.
#[async_trait]
pub trait MailboxActions: Send + Sync {
    async fn mark_read(&self, id: &str) -> Result<(), ActionError>;

    async fn mark_unread(&self, id: &str) -> Result<(), ActionError>;

    /// Move a message under `label_name`, creating the label if needed.
    ///
    /// Returns the message's label ids after the move.
    async fn move_to(
        &self,
        id: &str,
        label_name: &str,
        current_labels: &[String],
    ) -> Result<Vec<String>, ActionError>;
}

/// Provider + store pair.
pub struct Mailbox {
    provider: Arc<dyn MailProvider>,
    store: Arc<dyn MessageStore>,
}

impl Mailbox {
    pub fn new(provider: Arc<dyn MailProvider>, store: Arc<dyn MessageStore>) -> Self {
        Self { provider, store }
    }

    /// Replace the store's label table with the provider's labels.
    pub async fn refresh_labels(&self) -> error::Result<usize> {
        let labels = self.provider.list_labels().await?;
        self.store.replace_labels(&labels).await?;
        info!(count = labels.len(), "Label mapping refreshed");
        Ok(labels.len())
    }

    async fn resolve_label(&self, name: &str) -> Result<String, ActionError> {
        let action = ActionKind::MoveTo.as_str();

        if let Some(id) = self
            .store
            .label_id(name)
            .await
            .map_err(|source| ActionError::Store { action, source })?
        {
            return Ok(id);
        }

        let label = self
            .provider
            .create_label(name)
            .await
            .map_err(|source| ActionError::Provider { action, source })?;
        self.store
            .insert_label(&label)
            .await
            .map_err(|source| ActionError::Store { action, source })?;

        info!(name = name, id = %label.id, "Created missing label");
        Ok(label.id)
    }
}

#[async_trait]
impl MailboxActions for Mailbox {
    async fn mark_read(&self, id: &str) -> Result<(), ActionError> {
        let action = ActionKind::MarkRead.as_str();
        self.provider
            .mark_read(id)
            .await
            .map_err(|source| ActionError::Provider { action, source })?;
        self.store
            .mark_read(id)
            .await
            .map_err(|source| ActionError::Store { action, source })
    }

    async fn mark_unread(&self, id: &str) -> Result<(), ActionError> {
        let action = ActionKind::MarkUnread.as_str();
        self.provider
            .mark_unread(id)
            .await
            .map_err(|source| ActionError::Provider { action, source })?;
        self.store
            .mark_unread(id)
            .await
            .map_err(|source| ActionError::Store { action, source })
    }

    async fn move_to(
        &self,
        id: &str,
        label_name: &str,
        current_labels: &[String],
    ) -> Result<Vec<String>, ActionError> {
        let action = ActionKind::MoveTo.as_str();
        let target = self.resolve_label(label_name).await?;

        if current_labels.contains(&target) {
            debug!(id = id, label = %target, "Message already carries target label");
            return Ok(current_labels.to_vec());
        }

        let (mut kept, removed): (Vec<String>, Vec<String>) = current_labels
            .iter()
            .cloned()
            .partition(|label| SYSTEM_LABELS.contains(&label.as_str()));
        kept.push(target.clone());

        self.provider
            .modify_labels(id, std::slice::from_ref(&target), &removed)
            .await
            .map_err(|source| ActionError::Provider { action, source })?;
        self.store
            .set_labels(id, &kept)
            .await
            .map_err(|source| ActionError::Store { action, source })?;

        debug!(id = id, label = %target, removed = ?removed, "Message moved");
        Ok(kept)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::{DateTime, Utc};

    use crate::error::ProviderError;
    use crate::rules::model::MessageRecord;
    use crate::store::{Label, LibSqlBackend};

    /// In-process provider that records every call.
    #[derive(Default)]
    pub(crate) struct RecordingProvider {
        pub labels: Mutex<Vec<Label>>,
        pub calls: Mutex<Vec<String>>,
        pub fail_mark_read: bool,
    }

    impl RecordingProvider {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl MailProvider for RecordingProvider {
        async fn list_message_ids(
            &self,
            _after: DateTime<Utc>,
            _before: DateTime<Utc>,
            _max_results: u32,
        ) -> Result<Vec<String>, ProviderError> {
            Ok(Vec::new())
        }

        async fn get_message(&self, id: &str) -> Result<MessageRecord, ProviderError> {
            Err(ProviderError::Status {
                endpoint: "messages.get".into(),
                status: 404,
                body: id.to_string(),
            })
        }

        async fn mark_read(&self, id: &str) -> Result<(), ProviderError> {
            self.record(format!("mark_read {id}"));
            if self.fail_mark_read {
                return Err(ProviderError::Status {
                    endpoint: "messages.modify".into(),
                    status: 500,
                    body: String::new(),
                });
            }
            Ok(())
        }

        async fn mark_unread(&self, id: &str) -> Result<(), ProviderError> {
            self.record(format!("mark_unread {id}"));
            Ok(())
        }

        async fn modify_labels(
            &self,
            id: &str,
            add: &[String],
            remove: &[String],
        ) -> Result<(), ProviderError> {
            self.record(format!("modify {id} +{add:?} -{remove:?}"));
            Ok(())
        }

        async fn list_labels(&self) -> Result<Vec<Label>, ProviderError> {
            Ok(self.labels.lock().unwrap().clone())
        }

        async fn create_label(&self, name: &str) -> Result<Label, ProviderError> {
            self.record(format!("create_label {name}"));
            let mut labels = self.labels.lock().unwrap();
            let label = Label {
                id: format!("Label_{}", labels.len() + 1),
                name: name.to_string(),
            };
            labels.push(label.clone());
            Ok(label)
        }
    }

    fn record(id: &str, labels: &[&str]) -> MessageRecord {
        MessageRecord {
            id: id.into(),
            sender: "a@b.c".into(),
            subject: "s".into(),
            snippet: String::new(),
            received: "2026-01-01T00:00:00Z".into(),
            is_read: false,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    async fn mailbox(provider: RecordingProvider) -> (Mailbox, Arc<RecordingProvider>, Arc<LibSqlBackend>) {
        let provider = Arc::new(provider);
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let mailbox = Mailbox::new(provider.clone(), store.clone());
        (mailbox, provider, store)
    }

    #[tokio::test]
    async fn mark_read_writes_through() {
        let (mailbox, provider, store) = mailbox(RecordingProvider::default()).await;
        store.insert_messages(&[record("m", &["UNREAD"])]).await.unwrap();

        mailbox.mark_read("m").await.unwrap();
        mailbox.mark_read("m").await.unwrap();

        assert!(store.get_record("m").await.unwrap().unwrap().is_read);
        assert_eq!(provider.calls(), vec!["mark_read m", "mark_read m"]);
    }

    #[tokio::test]
    async fn provider_failure_leaves_store_untouched() {
        let (mailbox, _, store) = mailbox(RecordingProvider {
            fail_mark_read: true,
            ..Default::default()
        })
        .await;
        store.insert_messages(&[record("m", &["UNREAD"])]).await.unwrap();

        let err = mailbox.mark_read("m").await.unwrap_err();
        assert!(matches!(err, ActionError::Provider { action: "mark_as_read", .. }));
        assert!(!store.get_record("m").await.unwrap().unwrap().is_read);
    }

    #[tokio::test]
    async fn move_creates_label_once_and_keeps_system_labels() {
        let (mailbox, provider, store) = mailbox(RecordingProvider::default()).await;
        store
            .insert_messages(&[
                record("m1", &["INBOX", "UNREAD", "CATEGORY_UPDATES"]),
                record("m2", &["INBOX", "STARRED"]),
            ])
            .await
            .unwrap();

        let moved = mailbox
            .move_to("m1", "processed", &["INBOX".into(), "UNREAD".into(), "CATEGORY_UPDATES".into()])
            .await
            .unwrap();
        assert_eq!(moved, vec!["UNREAD", "Label_1"]);
        assert_eq!(store.get_record("m1").await.unwrap().unwrap().labels, moved);

        mailbox
            .move_to("m2", "processed", &["INBOX".into(), "STARRED".into()])
            .await
            .unwrap();

        let creates = provider
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("create_label"))
            .count();
        assert_eq!(creates, 1);
        assert_eq!(store.label_id("processed").await.unwrap().as_deref(), Some("Label_1"));
    }

    #[tokio::test]
    async fn move_to_current_label_is_a_no_op() {
        let (mailbox, provider, store) = mailbox(RecordingProvider::default()).await;
        store
            .insert_label(&Label {
                id: "Label_5".into(),
                name: "processed".into(),
            })
            .await
            .unwrap();

        let current = vec!["INBOX".to_string(), "Label_5".to_string()];
        let labels = mailbox.move_to("m", "processed", &current).await.unwrap();

        assert_eq!(labels, current);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn refresh_labels_mirrors_provider() {
        let provider = RecordingProvider::default();
        provider.labels.lock().unwrap().push(Label {
            id: "INBOX".into(),
            name: "INBOX".into(),
        });
        let (mailbox, _, store) = mailbox(provider).await;

        assert_eq!(mailbox.refresh_labels().await.unwrap(), 1);
        assert_eq!(store.label_id("INBOX").await.unwrap().as_deref(), Some("INBOX"));
    }
}
