//! Action dispatch for a fired rule group.
//!
//! Each action runs independently: a failure is logged and recorded, and the
//! remaining actions still run.

use tracing::{debug, info, warn};

use crate::error::ActionError;
use crate::mailbox::MailboxActions;
use crate::rules::model::{Action, ActionKind, ActionMap};

/// What happened to one action.
#[derive(Debug)]
pub enum ActionOutcome {
    Applied(ActionKind),
    /// A boolean action set to `false`.
    Skipped(ActionKind),
    Failed(ActionKind, ActionError),
}

impl ActionOutcome {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionOutcome::Applied(kind)
            | ActionOutcome::Skipped(kind)
            | ActionOutcome::Failed(kind, _) => *kind,
        }
    }

    /// Whether a mutation was actually issued.
    pub fn was_attempted(&self) -> bool {
        !matches!(self, ActionOutcome::Skipped(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ActionOutcome::Failed(..))
    }
}

/// Run a group's actions against one record, in document order.
///
/// A successful move writes the new label set back into `current_labels`.
pub async fn dispatch(
    mailbox: &dyn MailboxActions,
    record_id: &str,
    subject: &str,
    actions: &ActionMap,
    current_labels: &mut Vec<String>,
) -> Vec<ActionOutcome> {
    let mut outcomes = Vec::with_capacity(actions.len());

    for action in actions.iter() {
        let kind = action.kind();
        let result = match action {
            Action::MarkRead(false) | Action::MarkUnread(false) => {
                debug!(id = record_id, action = kind.as_str(), "Action disabled, skipping");
                outcomes.push(ActionOutcome::Skipped(kind));
                continue;
            }
            Action::MarkRead(true) => mailbox.mark_read(record_id).await,
            Action::MarkUnread(true) => mailbox.mark_unread(record_id).await,
            Action::MoveTo(label) => mailbox
                .move_to(record_id, label, current_labels)
                .await
                .map(|labels| *current_labels = labels),
        };

        match result {
            Ok(()) => {
                info!(id = record_id, subject = subject, action = kind.as_str(), "Action applied");
                outcomes.push(ActionOutcome::Applied(kind));
            }
            Err(e) => {
                warn!(
                    id = record_id,
                    subject = subject,
                    action = kind.as_str(),
                    error = %e,
                    "Action failed"
                );
                outcomes.push(ActionOutcome::Failed(kind, e));
            }
        }
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::ProviderError;

    /// Tracks read state per call; optionally rejects moves.
    #[derive(Default)]
    struct FakeMailbox {
        read: Mutex<bool>,
        calls: Mutex<Vec<String>>,
        reject_moves: bool,
    }

    #[async_trait]
    impl MailboxActions for FakeMailbox {
        async fn mark_read(&self, id: &str) -> Result<(), ActionError> {
            self.calls.lock().unwrap().push(format!("read {id}"));
            *self.read.lock().unwrap() = true;
            Ok(())
        }

        async fn mark_unread(&self, id: &str) -> Result<(), ActionError> {
            self.calls.lock().unwrap().push(format!("unread {id}"));
            *self.read.lock().unwrap() = false;
            Ok(())
        }

        async fn move_to(
            &self,
            id: &str,
            label_name: &str,
            _current_labels: &[String],
        ) -> Result<Vec<String>, ActionError> {
            self.calls.lock().unwrap().push(format!("move {id} {label_name}"));
            if self.reject_moves {
                return Err(ActionError::Provider {
                    action: ActionKind::MoveTo.as_str(),
                    source: ProviderError::Status {
                        endpoint: "messages.modify".into(),
                        status: 403,
                        body: "forbidden".into(),
                    },
                });
            }
            Ok(vec![format!("id:{label_name}")])
        }
    }

    #[tokio::test]
    async fn mark_read_twice_is_idempotent() {
        let mailbox = FakeMailbox::default();
        *mailbox.read.lock().unwrap() = true;
        let actions = ActionMap::new(vec![Action::MarkRead(true)]);
        let mut labels = Vec::new();

        for _ in 0..2 {
            let outcomes = dispatch(&mailbox, "m", "s", &actions, &mut labels).await;
            assert!(matches!(outcomes[..], [ActionOutcome::Applied(ActionKind::MarkRead)]));
            assert!(*mailbox.read.lock().unwrap());
        }
    }

    #[tokio::test]
    async fn false_flags_are_skipped() {
        let mailbox = FakeMailbox::default();
        let actions = ActionMap::new(vec![Action::MarkRead(false), Action::MarkUnread(false)]);

        let outcomes = dispatch(&mailbox, "m", "s", &actions, &mut Vec::new()).await;

        assert!(outcomes.iter().all(|o| !o.was_attempted()));
        assert!(mailbox.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_action_does_not_stop_siblings() {
        let mailbox = FakeMailbox {
            reject_moves: true,
            ..Default::default()
        };
        let actions = ActionMap::new(vec![
            Action::MoveTo("processed".into()),
            Action::MarkRead(true),
        ]);
        let mut labels = vec!["INBOX".to_string()];

        let outcomes = dispatch(&mailbox, "m", "s", &actions, &mut labels).await;

        assert!(outcomes[0].is_failure());
        assert_eq!(outcomes[0].kind(), ActionKind::MoveTo);
        assert!(matches!(outcomes[1], ActionOutcome::Applied(ActionKind::MarkRead)));
        assert_eq!(labels, vec!["INBOX"]);
        assert_eq!(
            *mailbox.calls.lock().unwrap(),
            vec!["move m processed", "read m"]
        );
    }

    #[tokio::test]
    async fn successful_move_updates_current_labels() {
        let mailbox = FakeMailbox::default();
        let actions = ActionMap::new(vec![Action::MoveTo("processed".into())]);
        let mut labels = vec!["INBOX".to_string()];

        dispatch(&mailbox, "m", "s", &actions, &mut labels).await;

        assert_eq!(labels, vec!["id:processed"]);
    }
}
