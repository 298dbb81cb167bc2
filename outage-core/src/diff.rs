use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{normalize, Snapshot, SnapshotCache};
use crate::client::FeedSource;
use crate::feed::Item;

/// What a reconciliation did to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The cache was empty and now holds the fetched list. Nothing is reported
    /// as new: consumers only take a baseline from it.
    Bootstrapped { items: usize },
    /// Nothing newer upstream; the cache was touched.
    Unchanged,
    /// New posts were prepended. `new_items` is oldest first.
    Extended { new_items: Vec<Item> },
}

impl Reconciliation {
    pub fn new_items(&self) -> &[Item] {
        match self {
            Reconciliation::Extended { new_items } => new_items,
            _ => &[],
        }
    }
}

/// Merges a freshly fetched list into the cache.
///
/// Only the prefix of `fresh` newer than the cached top id is taken; the scan
/// stops at the first id that is not newer. An upstream that republishes old
/// ids above newer ones is under-counted.
pub async fn reconcile(cache: &SnapshotCache, mut fresh: Vec<Item>) -> Reconciliation {
    let cached = cache.get().await.filter(|snapshot| !snapshot.is_empty());

    let Some(cached) = cached else {
        if fresh.is_empty() {
            debug!("feed and cache both empty, nothing to install");
            return Reconciliation::Unchanged;
        }
        let items = fresh.len();
        cache.replace(fresh).await;
        info!(items, "cache was empty, installed fetched posts");
        return Reconciliation::Bootstrapped { items };
    };

    if fresh.is_empty() {
        cache.touch().await;
        debug!("feed returned no posts, cache freshness extended");
        return Reconciliation::Unchanged;
    }

    normalize(&mut fresh);
    let cached_top = cached.top_id().unwrap_or_default();
    let fresh_top = fresh[0].id;

    if fresh_top <= cached_top {
        cache.touch().await;
        debug!(cached_top, fresh_top, "no new posts");
        return Reconciliation::Unchanged;
    }

    let new_count = fresh
        .iter()
        .take_while(|item| item.id > cached_top)
        .count();
    fresh.truncate(new_count);

    let mut merged = Vec::with_capacity(new_count + cached.items().len());
    merged.extend(fresh.iter().cloned());
    merged.extend(cached.items().iter().cloned());
    cache.replace(merged).await;

    fresh.reverse();
    info!(
        new = new_count,
        total = new_count + cached.items().len(),
        "new posts merged into cache"
    );
    Reconciliation::Extended { new_items: fresh }
}

/// Couples the feed source with the cache and serialises reconciliations.
pub struct Refresher {
    source: Arc<dyn FeedSource>,
    cache: SnapshotCache,
    gate: Mutex<()>,
}

impl Refresher {
    pub fn new(source: Arc<dyn FeedSource>, cache: SnapshotCache) -> Self {
        Self {
            source,
            cache,
            gate: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Fetches and reconciles, waiting for any reconciliation already running.
    pub async fn refresh(&self) -> Reconciliation {
        let _guard = self.gate.lock().await;
        self.fetch_and_reconcile().await
    }

    /// Like [`Refresher::refresh`] but returns `None` instead of waiting when
    /// another reconciliation is in flight.
    pub async fn try_refresh(&self) -> Option<Reconciliation> {
        let Ok(_guard) = self.gate.try_lock() else {
            debug!("reconciliation already in flight, skipping");
            return None;
        };
        Some(self.fetch_and_reconcile().await)
    }

    /// Returns the cached snapshot, pulling the feed first when the cache is
    /// empty. `None` when the feed could not provide anything.
    pub async fn ensure_bootstrapped(&self) -> Option<Arc<Snapshot>> {
        if let Some(snapshot) = self.cache.get().await.filter(|s| !s.is_empty()) {
            return Some(snapshot);
        }
        let _guard = self.gate.lock().await;
        // another caller may have filled it while we waited
        if self.cache.is_empty().await {
            self.fetch_and_reconcile().await;
        }
        self.cache.get().await.filter(|s| !s.is_empty())
    }

    async fn fetch_and_reconcile(&self) -> Reconciliation {
        let fresh = match self.source.fetch_items().await {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "feed fetch failed, treating as empty");
                Vec::new()
            }
        };
        reconcile(&self.cache, fresh).await
    }
}
