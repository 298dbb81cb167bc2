use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::feed::ItemId;
use crate::matcher::AddressFilter;

/// One address subscription of a chat. A chat may own several.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscriber {
    pub chat_id: i64,
    #[serde(flatten)]
    pub filter: AddressFilter,
    /// Newest post id already delivered for this row. Never decreases.
    pub last_seen_id: ItemId,
}

impl Subscriber {
    pub fn new(chat_id: i64, filter: AddressFilter, last_seen_id: ItemId) -> Self {
        Self {
            chat_id,
            filter,
            last_seen_id,
        }
    }
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError>;

    /// Moves the row's cursor forward; a lower id than the stored one is ignored.
    async fn advance_cursor(
        &self,
        chat_id: i64,
        filter: &AddressFilter,
        last_seen_id: ItemId,
    ) -> Result<(), StoreError>;

    /// Returns `false` when the chat already follows this address, compared
    /// case-insensitively.
    async fn add(&self, subscriber: Subscriber) -> Result<bool, StoreError>;

    async fn list_for_chat(&self, chat_id: i64) -> Result<Vec<Subscriber>, StoreError>;

    async fn remove_chat(&self, chat_id: i64) -> Result<usize, StoreError>;

    /// Removes the chat's rows for this street; an empty house number removes
    /// every number on the street.
    async fn remove_address(
        &self,
        chat_id: i64,
        filter: &AddressFilter,
    ) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
struct SubscriptionData {
    subscriptions: Vec<Subscriber>,
}

/// Subscriptions kept in memory and mirrored to a JSON file.
///
/// Every change is applied to a copy, written to `<file>.json.tmp`, renamed
/// over the main file and only then made visible, so a failed write leaves
/// both disk and memory at the previous state.
#[derive(Debug, Clone)]
pub struct JsonSubscriptionStore {
    inner: Arc<RwLock<SubscriptionData>>,
    path: Option<PathBuf>,
}

impl JsonSubscriptionStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SubscriptionData::default())),
            path: None,
        }
    }

    pub async fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = read_with_tmp_fallback(&path).await;
        debug!(count = data.subscriptions.len(), path = %path.display(), "loaded subscriptions");
        Self {
            inner: Arc::new(RwLock::new(data)),
            path: Some(path),
        }
    }

    async fn update<F, R>(&self, change: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut SubscriptionData) -> R + Send,
        R: Send,
    {
        let mut guard = self.inner.write().await;
        let mut next = guard.clone();
        let result = change(&mut next);
        if next != *guard {
            self.persist(&next).await?;
            *guard = next;
        }
        Ok(result)
    }

    async fn persist(&self, data: &SubscriptionData) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            debug!("subscription store is in-memory only; skipping persist");
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(data)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

async fn read_with_tmp_fallback(path: &Path) -> SubscriptionData {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to parse subscriptions, trying tmp fallback");
                let tmp = path.with_extension("json.tmp");
                match tokio::fs::read(&tmp).await {
                    Ok(tmp_bytes) => serde_json::from_slice(&tmp_bytes).unwrap_or_default(),
                    Err(_) => SubscriptionData::default(),
                }
            }
        },
        Err(_) => SubscriptionData::default(),
    }
}

fn same_text(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[async_trait]
impl SubscriptionStore for JsonSubscriptionStore {
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        Ok(self.inner.read().await.subscriptions.clone())
    }

    async fn advance_cursor(
        &self,
        chat_id: i64,
        filter: &AddressFilter,
        last_seen_id: ItemId,
    ) -> Result<(), StoreError> {
        let matched = self
            .update(|data| {
                let mut matched = false;
                for row in data
                    .subscriptions
                    .iter_mut()
                    .filter(|row| row.chat_id == chat_id && &row.filter == filter)
                {
                    row.last_seen_id = row.last_seen_id.max(last_seen_id);
                    matched = true;
                }
                matched
            })
            .await?;
        if !matched {
            debug!(chat_id, address = %filter, "cursor update for a removed subscription");
        }
        Ok(())
    }

    async fn add(&self, subscriber: Subscriber) -> Result<bool, StoreError> {
        self.update(|data| {
            let exists = data.subscriptions.iter().any(|row| {
                row.chat_id == subscriber.chat_id
                    && same_text(&row.filter.street, &subscriber.filter.street)
                    && same_text(&row.filter.number, &subscriber.filter.number)
            });
            if !exists {
                data.subscriptions.push(subscriber);
            }
            !exists
        })
        .await
    }

    async fn list_for_chat(&self, chat_id: i64) -> Result<Vec<Subscriber>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|row| row.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn remove_chat(&self, chat_id: i64) -> Result<usize, StoreError> {
        self.update(|data| {
            let before = data.subscriptions.len();
            data.subscriptions.retain(|row| row.chat_id != chat_id);
            before - data.subscriptions.len()
        })
        .await
    }

    async fn remove_address(
        &self,
        chat_id: i64,
        filter: &AddressFilter,
    ) -> Result<usize, StoreError> {
        self.update(|data| {
            let before = data.subscriptions.len();
            data.subscriptions.retain(|row| {
                let hit = row.chat_id == chat_id
                    && same_text(&row.filter.street, &filter.street)
                    && (filter.number.is_empty() || same_text(&row.filter.number, &filter.number));
                !hit
            });
            before - data.subscriptions.len()
        })
        .await
    }
}
