//! The upstream mailbox the local store mirrors.

pub mod gmail;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;
use crate::rules::model::MessageRecord;
use crate::store::Label;

pub use gmail::GmailClient;

/// Label id the provider uses to flag unread messages.
pub const UNREAD_LABEL: &str = "UNREAD";

/// Async interface to the remote mailbox.
///
/// Mark-read/unread are idempotent; label moves are safe to repeat.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Ids of messages received in `[after, before)`, at most `max_results`.
    async fn list_message_ids(
        &self,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<String>, ProviderError>;

    /// Header metadata for one message.
    async fn get_message(&self, id: &str) -> Result<MessageRecord, ProviderError>;

    async fn mark_read(&self, id: &str) -> Result<(), ProviderError>;

    async fn mark_unread(&self, id: &str) -> Result<(), ProviderError>;

    /// Add and remove label ids in one request.
    async fn modify_labels(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), ProviderError>;

    async fn list_labels(&self) -> Result<Vec<Label>, ProviderError>;

    /// Create a user label and return it with its provider-assigned id.
    async fn create_label(&self, name: &str) -> Result<Label, ProviderError>;
}
