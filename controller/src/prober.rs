use chrono::Utc;
use skyshelf_daemon::Daemon;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::RemoteRecord;

/// Runs single capacity queries and folds the outcome into a record.
#[derive(Clone)]
pub struct CapacityProber {
    daemon: Arc<dyn Daemon>,
}

impl CapacityProber {
    pub fn new(daemon: Arc<dyn Daemon>) -> Self {
        CapacityProber { daemon }
    }

    /// Never fails: daemon errors end up in the record. The timestamp is taken
    /// once the call has returned.
    pub async fn probe(&self, remote: &str) -> RemoteRecord {
        match self.daemon.about(remote).await {
            Ok(capacity) => {
                debug!(
                    "probe {}: total={:?} used={:?} free={:?}",
                    remote, capacity.total, capacity.used, capacity.free
                );
                RemoteRecord::healthy(capacity, Utc::now())
            }
            Err(err) => {
                warn!("probe {} failed ({:?}): {}", remote, err.kind(), err.message());
                RemoteRecord::failed(&err, Utc::now())
            }
        }
    }
}
