use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::observability::WAL_COMPACTIONS_TOTAL;
use crate::store::{LocalStore, StoreError};

/// Compact the store's WAL if at least `threshold` events were appended since the last compaction.
pub async fn compact_if_due(store: &LocalStore, threshold: u64) -> Result<bool, StoreError> {
    let appended = store.wal_appends_since_compact().await;
    if appended < threshold {
        return Ok(false);
    }
    store.compact().await?;
    metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
    info!("compacted WAL after {appended} appends");
    Ok(true)
}

/// Background task that checks the WAL every `period`.
pub async fn run_compactor(store: Arc<LocalStore>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&store, threshold).await {
            tracing::warn!("compaction failed: {e}");
        }
    }
}
