use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use skyshelf_daemon::{Capacity, DaemonError, FailureKind};
use std::collections::HashMap;

// -----------------------------------------------------------------------------
// Records
// -----------------------------------------------------------------------------

/// Last known capacity state of one remote.
///
/// A record is either healthy (sizes present, no error) or failed (error
/// present, no sizes). The two constructors are the only way to build one.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    free: Option<u64>,
    last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<FailureKind>,
}

impl RemoteRecord {
    pub fn healthy(capacity: Capacity, at: DateTime<Utc>) -> Self {
        RemoteRecord {
            total: capacity.total,
            used: capacity.used,
            free: capacity.free,
            last_updated: at,
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(err: &DaemonError, at: DateTime<Utc>) -> Self {
        RemoteRecord {
            total: None,
            used: None,
            free: None,
            last_updated: at,
            error: Some(err.message().to_string()),
            error_kind: Some(err.kind()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Whether clients would see a different picture. Free space and the
    /// update clock do not count.
    fn differs_from(&self, other: &RemoteRecord) -> bool {
        self.total != other.total || self.used != other.used || self.error != other.error
    }
}

#[cfg(test)]
impl RemoteRecord {
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn used(&self) -> Option<u64> {
        self.used
    }

    pub fn free(&self) -> Option<u64> {
        self.free
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_kind(&self) -> Option<FailureKind> {
        self.error_kind
    }
}

/// Point-in-time copy of the whole cache.
pub type Snapshot = HashMap<String, RemoteRecord>;

// -----------------------------------------------------------------------------
// Cache
// -----------------------------------------------------------------------------

/// Remote name -> latest record. Entries are replaced, never removed; a remote
/// dropped from the daemon's configuration simply goes stale.
#[derive(Debug, Default)]
pub struct TelemetryCache {
    entries: RwLock<HashMap<String, RemoteRecord>>,
}

impl TelemetryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.entries.read().clone()
    }

    /// Copy of the cache together with its oldest `lastUpdated`, both taken
    /// under the same read lock.
    pub fn snapshot_with_oldest(&self) -> (Snapshot, Option<DateTime<Utc>>) {
        let entries = self.entries.read();
        let oldest = entries.values().map(|r| r.last_updated).min();
        (entries.clone(), oldest)
    }

    #[cfg(test)]
    pub fn get(&self, remote: &str) -> Option<RemoteRecord> {
        self.entries.read().get(remote).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Stores `record` and reports whether it changed anything a client cares
    /// about (total, used or error).
    pub fn merge_one(&self, remote: &str, record: RemoteRecord) -> bool {
        let mut entries = self.entries.write();
        let changed = match entries.get(remote) {
            Some(previous) => previous.differs_from(&record),
            None => true,
        };
        entries.insert(remote.to_string(), record);
        changed
    }
}
