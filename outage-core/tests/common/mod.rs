#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outage_core::{DeliveryChannel, DeliveryError, FeedSource, FetchError, Item, ItemId};
use tokio::sync::Notify;

pub fn at(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap()
}

pub fn item(id: ItemId, text: &str) -> Item {
    Item::new(id, text, at(1_700_000_000 + id as i64 * 60))
}

/// Items with the given ids (newest first as passed) and a generic outage text.
pub fn items(ids: &[ItemId]) -> Vec<Item> {
    ids.iter()
        .map(|id| item(*id, &format!("Отключение воды, пост {id}")))
        .collect()
}

pub fn ids(items: &[Item]) -> Vec<ItemId> {
    items.iter().map(|item| item.id).collect()
}

/// Feed returning whatever was last set; `None` simulates a failed request.
#[derive(Default)]
pub struct ScriptedFeed {
    next: Mutex<Option<Vec<Item>>>,
    pub calls: Mutex<usize>,
}

impl ScriptedFeed {
    pub fn with(items: Vec<Item>) -> Self {
        let feed = Self::default();
        feed.set(items);
        feed
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn set(&self, items: Vec<Item>) {
        *self.next.lock().unwrap() = Some(items);
    }

    pub fn fail(&self) {
        *self.next.lock().unwrap() = None;
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch_items(&self) -> Result<Vec<Item>, FetchError> {
        *self.calls.lock().unwrap() += 1;
        self.next
            .lock()
            .unwrap()
            .clone()
            .ok_or(FetchError::Malformed("scripted failure"))
    }
}

/// Feed whose requests hang until [`GatedFeed::release`] is called.
pub struct GatedFeed {
    items: Vec<Item>,
    calls: Mutex<usize>,
    started: Notify,
    release: Notify,
}

impl GatedFeed {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            calls: Mutex::new(0),
            started: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Resolves once a request is in flight.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl FeedSource for GatedFeed {
    async fn fetch_items(&self) -> Result<Vec<Item>, FetchError> {
        *self.calls.lock().unwrap() += 1;
        self.started.notify_one();
        self.release.notified().await;
        Ok(self.items.clone())
    }
}

/// Records every delivery; fails on the configured item id.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<(i64, ItemId)>>,
    fail_on: Mutex<Option<ItemId>>,
}

impl RecordingChannel {
    pub fn fail_on(&self, id: Option<ItemId>) {
        *self.fail_on.lock().unwrap() = id;
    }

    pub fn sent(&self) -> Vec<(i64, ItemId)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<ItemId> {
        self.sent()
            .into_iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, id)| id)
            .collect()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn deliver(&self, chat_id: i64, item: &Item) -> Result<(), DeliveryError> {
        if *self.fail_on.lock().unwrap() == Some(item.id) {
            return Err(DeliveryError::Api {
                code: 429,
                message: "Too Many Requests".into(),
            });
        }
        self.sent.lock().unwrap().push((chat_id, item.id));
        Ok(())
    }
}

pub fn temp_dir(prefix: &str) -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "{prefix}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    dir
}
