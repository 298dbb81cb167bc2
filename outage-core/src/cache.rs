use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::feed::{Item, ItemId};

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Immutable copy of the feed, newest first with unique ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    items: Vec<Item>,
    fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(mut items: Vec<Item>, fetched_at: DateTime<Utc>) -> Self {
        normalize(&mut items);
        Self { items, fetched_at }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn top_id(&self) -> Option<ItemId> {
        self.items.first().map(|item| item.id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now - self.fetched_at > ttl
    }
}

/// Sorts newest first and drops repeated ids.
pub(crate) fn normalize(items: &mut Vec<Item>) {
    items.sort_by(|a, b| b.id.cmp(&a.id));
    items.dedup_by_key(|item| item.id);
}

/// Process-wide holder of the latest [`Snapshot`].
///
/// Writers swap the whole `Arc`, so a reader holding a snapshot never sees a
/// half-built list. The tokio lock is write-preferring, so a stream of readers
/// cannot starve `replace`/`touch`.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    inner: Arc<RwLock<Option<Arc<Snapshot>>>>,
    ttl: TimeDelta,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        Self {
            inner: Arc::new(RwLock::new(None)),
            ttl,
        }
    }

    /// Current snapshot, or `None` when never filled or older than the TTL.
    pub async fn get(&self) -> Option<Arc<Snapshot>> {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(snapshot) if snapshot.is_expired_at(Utc::now(), self.ttl) => {
                debug!(fetched_at = %snapshot.fetched_at, "cached snapshot expired");
                None
            }
            other => other.cloned(),
        }
    }

    pub async fn replace(&self, items: Vec<Item>) {
        let snapshot = Arc::new(Snapshot::new(items, Utc::now()));
        *self.inner.write().await = Some(snapshot);
    }

    /// Marks the cached items as checked now. No-op on an empty cache.
    pub async fn touch(&self) {
        let mut guard = self.inner.write().await;
        if let Some(current) = guard.as_ref() {
            let refreshed = Snapshot {
                items: current.items.clone(),
                fetched_at: Utc::now(),
            };
            *guard = Some(Arc::new(refreshed));
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.get().await.map_or(true, |snapshot| snapshot.is_empty())
    }
}
