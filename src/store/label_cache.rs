//! Lazily loaded label name → id map.
//!
//! Owned by the store backend. Filled from the `labels` table on first lookup
//! and dropped whenever the table changes.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::DatabaseError;

#[derive(Debug, Default)]
pub struct LabelCache {
    names: RwLock<Option<HashMap<String, String>>>,
}

impl LabelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a label id by name, running `load` first if the cache is cold.
    ///
    /// A failed load leaves the cache cold.
    pub async fn get_or_load<F, Fut>(
        &self,
        name: &str,
        load: F,
    ) -> Result<Option<String>, DatabaseError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<HashMap<String, String>, DatabaseError>>,
    {
        if let Some(names) = self.names.read().await.as_ref() {
            return Ok(names.get(name).cloned());
        }

        let mut guard = self.names.write().await;
        // Another caller may have filled it while we waited for the write lock.
        if guard.is_none() {
            let loaded = load().await?;
            debug!(count = loaded.len(), "Label cache loaded");
            *guard = Some(loaded);
        }
        Ok(guard.as_ref().and_then(|names| names.get(name).cloned()))
    }

    pub async fn invalidate(&self) {
        *self.names.write().await = None;
    }

    pub async fn is_loaded(&self) -> bool {
        self.names.read().await.is_some()
    }
}
