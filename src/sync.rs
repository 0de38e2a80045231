//! Pull recent messages from the provider into the local store.

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::error;
use crate::provider::MailProvider;
use crate::store::MessageStore;

/// How far back and how wide a sync reaches.
#[derive(Debug, Clone, Copy)]
pub struct SyncWindow {
    pub days: u32,
    pub max_results: u32,
    pub concurrency: usize,
}

/// Fetch messages received in the last `window.days` days and insert the new ones.
///
/// A message whose detail fetch fails is skipped. Returns the number inserted.
pub async fn sync_recent(
    provider: &dyn MailProvider,
    store: &dyn MessageStore,
    window: SyncWindow,
) -> error::Result<usize> {
    let before = Utc::now();
    let after = before - Duration::days(i64::from(window.days));

    let ids = provider
        .list_message_ids(after, before, window.max_results)
        .await?;
    if ids.is_empty() {
        info!(days = window.days, "No messages in sync window");
        return Ok(0);
    }

    let records: Vec<_> = stream::iter(ids.iter())
        .map(|id| async move { (id, provider.get_message(id).await) })
        .buffer_unordered(window.concurrency.max(1))
        .filter_map(|(id, result)| async move {
            match result {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(id = %id, error = %e, "Skipping message that failed to fetch");
                    None
                }
            }
        })
        .collect()
        .await;

    let inserted = store.insert_messages(&records).await?;
    info!(
        listed = ids.len(),
        fetched = records.len(),
        inserted = inserted,
        "Sync complete"
    );
    Ok(inserted)
}
