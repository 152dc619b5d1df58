use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::store::{Store, StoreError};

pub const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact the WAL if at least `threshold` records were appended since the
/// last compaction. Returns whether a compaction ran.
pub async fn compact_if_needed(store: &Store, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        debug!(appends, threshold, "compaction not needed");
        return Ok(false);
    }
    store.compact_wal().await?;
    Ok(true)
}

/// Background task that keeps the WAL from growing without bound.
/// Expired holds are history and survive compaction; nothing is swept.
pub async fn run_compactor(store: Arc<Store>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&store, threshold).await {
            warn!("WAL compaction failed: {e}");
        }
    }
}
