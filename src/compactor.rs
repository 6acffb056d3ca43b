use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{info, warn};

use crate::notify::NotifyHub;
use crate::observability::COMPACTIONS_TOTAL;
use crate::store::LedgerStore;

/// Background task per venue: prune idle notify channels and compact the
/// WAL once enough appends pile up. Exits when the store is dropped.
pub async fn run_compactor(store: Weak<LedgerStore>, notify: Arc<NotifyHub>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let Some(store) = store.upgrade() else { return };
        notify.prune();
        compact_if_needed(&store, threshold).await;
    }
}

/// Returns true if a compaction ran and succeeded.
pub async fn compact_if_needed(store: &LedgerStore, threshold: u64) -> bool {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact_wal().await {
        Ok(()) => {
            metrics::counter!(COMPACTIONS_TOTAL, "status" => "ok").increment(1);
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            metrics::counter!(COMPACTIONS_TOTAL, "status" => "error").increment(1);
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}
