//! `MessageStore` trait, the async interface the engine and sync use for persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::rules::compiler::SqlPredicate;
use crate::rules::model::MessageRecord;

/// A provider label as mirrored in the `labels` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Backend-agnostic message and label store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    /// Insert records, skipping ids already present. Returns how many were new.
    async fn insert_messages(&self, records: &[MessageRecord]) -> Result<usize, DatabaseError>;

    /// Every stored record, oldest insert first.
    async fn fetch_all_records(&self) -> Result<Vec<MessageRecord>, DatabaseError>;

    /// Records for which a compiled predicate holds.
    async fn filter_records(
        &self,
        predicate: &SqlPredicate,
    ) -> Result<Vec<MessageRecord>, DatabaseError>;

    async fn get_record(&self, id: &str) -> Result<Option<MessageRecord>, DatabaseError>;

    /// Set the read flag. `NotFound` if no such record.
    async fn mark_read(&self, id: &str) -> Result<(), DatabaseError>;

    /// Clear the read flag. `NotFound` if no such record.
    async fn mark_unread(&self, id: &str) -> Result<(), DatabaseError>;

    /// Overwrite a record's label ids. `NotFound` if no such record.
    async fn set_labels(&self, id: &str, labels: &[String]) -> Result<(), DatabaseError>;

    async fn message_count(&self) -> Result<usize, DatabaseError>;

    // ── Labels ──────────────────────────────────────────────────────

    /// Replace the whole label table.
    async fn replace_labels(&self, labels: &[Label]) -> Result<(), DatabaseError>;

    /// Insert one label, ignoring a duplicate id.
    async fn insert_label(&self, label: &Label) -> Result<(), DatabaseError>;

    /// Resolve a label name to its id.
    async fn label_id(&self, name: &str) -> Result<Option<String>, DatabaseError>;

    async fn list_labels(&self) -> Result<Vec<Label>, DatabaseError>;
}
