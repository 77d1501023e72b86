use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use bytes::Bytes;
use portwire_frame::{ReplyFilter, ReplyKind};

/// One reply held by the [`ReplyCache`].
///
/// Identical payloads recorded twice are distinct entries with distinct ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedReply {
    pub id: u64,
    pub partition: ReplyKind,
    pub data: Bytes,
    /// When the reply was recorded.
    pub received: Instant,
}

/// Correlation cache for replies that may answer any of several outstanding sends.
///
/// Two independent partitions hold response-class and result-class replies
/// in insertion order. The cache is an explicitly owned instance: a session
/// creates one or is handed one, and collaborators receive the same `Arc`.
#[derive(Default)]
pub struct ReplyCache {
    next_id: AtomicU64,
    responses: RwLock<Vec<CachedReply>>,
    results: RwLock<Vec<CachedReply>>,
}

impl ReplyCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, kind: ReplyKind) -> &RwLock<Vec<CachedReply>> {
        match kind {
            ReplyKind::Response => &self.responses,
            ReplyKind::Result => &self.results,
        }
    }

    fn read(&self, kind: ReplyKind) -> RwLockReadGuard<'_, Vec<CachedReply>> {
        self.partition(kind)
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self, kind: ReplyKind) -> RwLockWriteGuard<'_, Vec<CachedReply>> {
        self.partition(kind)
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a reply to `partition` and return the stored entry.
    pub fn record(&self, partition: ReplyKind, data: impl Into<Bytes>) -> CachedReply {
        let entry = CachedReply {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            partition,
            data: data.into(),
            received: Instant::now(),
        };
        self.write(partition).push(entry.clone());
        entry
    }

    /// First entry in insertion order that `filter(sent, entry, partition)`
    /// accepts, or the first entry when no filter is given. Nothing is removed.
    pub fn query(
        &self,
        partition: ReplyKind,
        sent: &[u8],
        filter: Option<&ReplyFilter>,
    ) -> Option<CachedReply> {
        self.read(partition)
            .iter()
            .find(|entry| filter.is_none_or(|accept| accept(sent, &entry.data, partition)))
            .cloned()
    }

    /// Remove a specific entry. Returns `false` if it was already gone.
    pub fn consume(&self, entry: &CachedReply) -> bool {
        let mut entries = self.write(entry.partition);
        match entries.iter().position(|e| e.id == entry.id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drop every entry in `partition`.
    pub fn clear(&self, partition: ReplyKind) {
        self.write(partition).clear();
    }

    /// Drop every entry in both partitions.
    pub fn clear_all(&self) {
        self.clear(ReplyKind::Response);
        self.clear(ReplyKind::Result);
    }

    /// Number of entries in `partition`.
    pub fn len(&self, partition: ReplyKind) -> usize {
        self.read(partition).len()
    }

    /// Whether both partitions are empty.
    pub fn is_empty(&self) -> bool {
        self.len(ReplyKind::Response) == 0 && self.len(ReplyKind::Result) == 0
    }

    /// Copy of the entries in `partition`, in insertion order.
    pub fn snapshot(&self, partition: ReplyKind) -> Vec<CachedReply> {
        self.read(partition).clone()
    }
}

impl std::fmt::Debug for ReplyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyCache")
            .field("responses", &self.len(ReplyKind::Response))
            .field("results", &self.len(ReplyKind::Result))
            .finish()
    }
}
