//! libSQL backend: async `MessageStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::rules::compiler::SqlPredicate;
use crate::rules::evaluator::canonical_received;
use crate::rules::model::MessageRecord;
use crate::store::label_cache::LabelCache;
use crate::store::migrations;
use crate::store::traits::{Label, MessageStore};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    labels: LabelCache,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        Ok(Self {
            db: Arc::new(db),
            conn,
            labels: LabelCache::new(),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_records(
        &self,
        sql: &str,
        params: Vec<libsql::Value>,
        op: &str,
    ) -> Result<Vec<MessageRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            match row_to_record(&row) {
                Ok(record) => records.push(record),
                Err(e) => warn!(op = op, error = %e, "Skipping undecodable email row"),
            }
        }
        Ok(records)
    }

    async fn update_one(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
        id: &str,
        op: &str,
    ) -> Result<(), DatabaseError> {
        let changed = self
            .conn()
            .execute(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "email".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Fill `received_at` for rows written before the column existed.
    ///
    /// Rows whose `received` does not parse stay NULL.
    async fn backfill_received_at(&self) -> Result<(), DatabaseError> {
        let op = "backfill_received_at";
        let mut rows = self
            .conn()
            .query("SELECT id, received FROM emails WHERE received_at IS NULL", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut pending = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            let id: String = row.get(0).map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
            let received: String = row.get(1).map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
            if let Some(canonical) = canonical_received(&received) {
                pending.push((id, canonical));
            }
        }
        drop(rows);

        for (id, canonical) in &pending {
            self.conn()
                .execute(
                    "UPDATE emails SET received_at = ?1 WHERE id = ?2",
                    params![canonical.as_str(), id.as_str()],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "Backfilled received_at");
        }
        Ok(())
    }

    /// Run raw SQL against the store.
    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<u64, DatabaseError> {
        self.conn()
            .execute(sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("execute_raw: {e}")))
    }

    async fn label_map(&self) -> Result<HashMap<String, String>, DatabaseError> {
        Ok(self
            .list_labels()
            .await?
            .into_iter()
            .map(|label| (label.name, label.id))
            .collect())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Column list for all record queries (must match `row_to_record`).
const RECORD_COLUMNS: &str = "id, sender, subject, snippet, received, is_read, labels";

/// Map a libsql Row to a MessageRecord.
///
/// Column order matches RECORD_COLUMNS.
fn row_to_record(row: &libsql::Row) -> Result<MessageRecord, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("row parse: {e}"));

    let id: String = row.get(0).map_err(parse)?;
    let labels_raw: String = row.get(6).map_err(parse)?;
    let labels = labels_from_column(&id, &labels_raw);

    Ok(MessageRecord {
        id,
        sender: row.get(1).map_err(parse)?,
        subject: row.get(2).map_err(parse)?,
        snippet: row.get(3).map_err(parse)?,
        received: row.get(4).map_err(parse)?,
        is_read: row.get::<i64>(5).map_err(parse)? != 0,
        labels,
    })
}

/// Decode the `labels` column.
///
/// Older stores kept labels `|`-joined; anything that is not a JSON array is
/// read that way.
fn labels_from_column(id: &str, raw: &str) -> Vec<String> {
    match serde_json::from_str(raw) {
        Ok(labels) => labels,
        Err(e) => {
            debug!(id = id, error = %e, "labels column is not JSON, splitting on '|'");
            raw.split('|')
                .map(str::trim)
                .filter(|label| !label.is_empty())
                .map(str::to_string)
                .collect()
        }
    }
}

fn labels_to_json(labels: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(labels).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

// ── MessageStore trait implementation ───────────────────────────────

#[async_trait]
impl MessageStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await?;
        self.backfill_received_at().await
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn insert_messages(&self, records: &[MessageRecord]) -> Result<usize, DatabaseError> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_messages begin: {e}")))?;

        let mut inserted = 0;
        for record in records {
            let changed = tx
                .execute(
                    "INSERT OR IGNORE INTO emails (id, sender, subject, snippet, received, received_at, is_read, labels)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        record.id.as_str(),
                        record.sender.as_str(),
                        record.subject.as_str(),
                        record.snippet.as_str(),
                        record.received.as_str(),
                        canonical_received(&record.received)
                            .map_or(libsql::Value::Null, libsql::Value::Text),
                        i64::from(record.is_read),
                        labels_to_json(&record.labels)?,
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("insert_messages: {e}")))?;
            inserted += changed as usize;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_messages commit: {e}")))?;

        debug!(
            offered = records.len(),
            inserted = inserted,
            "Messages inserted into DB"
        );
        Ok(inserted)
    }

    async fn fetch_all_records(&self) -> Result<Vec<MessageRecord>, DatabaseError> {
        self.query_records(
            &format!("SELECT {RECORD_COLUMNS} FROM emails ORDER BY rowid"),
            Vec::new(),
            "fetch_all_records",
        )
        .await
    }

    async fn filter_records(
        &self,
        predicate: &SqlPredicate,
    ) -> Result<Vec<MessageRecord>, DatabaseError> {
        let params = predicate
            .params
            .iter()
            .cloned()
            .map(libsql::Value::Text)
            .collect();
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM emails WHERE {} ORDER BY rowid",
                predicate.sql
            ),
            params,
            "filter_records",
        )
        .await
    }

    async fn get_record(&self, id: &str) -> Result<Option<MessageRecord>, DatabaseError> {
        let mut records = self
            .query_records(
                &format!("SELECT {RECORD_COLUMNS} FROM emails WHERE id = ?1"),
                vec![libsql::Value::Text(id.to_string())],
                "get_record",
            )
            .await?;
        Ok(records.pop())
    }

    async fn mark_read(&self, id: &str) -> Result<(), DatabaseError> {
        self.update_one(
            "UPDATE emails SET is_read = 1 WHERE id = ?1",
            params![id],
            id,
            "mark_read",
        )
        .await
    }

    async fn mark_unread(&self, id: &str) -> Result<(), DatabaseError> {
        self.update_one(
            "UPDATE emails SET is_read = 0 WHERE id = ?1",
            params![id],
            id,
            "mark_unread",
        )
        .await
    }

    async fn set_labels(&self, id: &str, labels: &[String]) -> Result<(), DatabaseError> {
        self.update_one(
            "UPDATE emails SET labels = ?1 WHERE id = ?2",
            params![labels_to_json(labels)?, id],
            id,
            "set_labels",
        )
        .await
    }

    async fn message_count(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM emails", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("message_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("message_count: {e}")))?;
                Ok(count as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("message_count: {e}"))),
        }
    }

    // ── Labels ──────────────────────────────────────────────────────

    async fn replace_labels(&self, labels: &[Label]) -> Result<(), DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_labels begin: {e}")))?;

        tx.execute("DELETE FROM labels", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_labels: {e}")))?;
        for label in labels {
            tx.execute(
                "INSERT OR REPLACE INTO labels (id, name) VALUES (?1, ?2)",
                params![label.id.as_str(), label.name.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_labels: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_labels commit: {e}")))?;
        self.labels.invalidate().await;

        debug!(count = labels.len(), "Label table replaced");
        Ok(())
    }

    async fn insert_label(&self, label: &Label) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO labels (id, name) VALUES (?1, ?2)",
                params![label.id.as_str(), label.name.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_label: {e}")))?;
        self.labels.invalidate().await;

        debug!(id = %label.id, name = %label.name, "Label inserted into DB");
        Ok(())
    }

    async fn label_id(&self, name: &str) -> Result<Option<String>, DatabaseError> {
        self.labels.get_or_load(name, || self.label_map()).await
    }

    async fn list_labels(&self) -> Result<Vec<Label>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT id, name FROM labels ORDER BY name", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("list_labels: {e}")))?;

        let mut labels = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_labels: {e}")))?
        {
            labels.push(Label {
                id: row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
                name: row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
            });
        }
        Ok(labels)
    }
}
