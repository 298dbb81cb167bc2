use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::diff::Refresher;
use crate::error::{DeliveryError, StoreError, SubscribeError};
use crate::feed::{Item, ItemId};
use crate::matcher::{match_items, AddressFilter};
use crate::storage::{Subscriber, SubscriptionStore};

/// Outbound channel to a chat.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn deliver(&self, chat_id: i64, item: &Item) -> Result<(), DeliveryError>;
}

/// Posts newer than the subscriber's cursor that match its address, oldest
/// first and without repeated ids.
pub fn pending_items(subscriber: &Subscriber, items: &[Item]) -> Vec<Item> {
    let newer = items
        .iter()
        .filter(|item| item.id > subscriber.last_seen_id);
    let mut matched = match_items(newer, &subscriber.filter);
    matched.sort_by_key(|item| item.id);
    matched.dedup_by_key(|item| item.id);
    matched
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberOutcome {
    UpToDate,
    /// `items` counts actual sends; posts the chat already got through
    /// another of its rows in the same pass only move the cursor.
    Delivered { items: usize, cursor: ItemId },
    /// The batch stopped at a failed delivery; the cursor was left untouched.
    DeliveryFailed { delivered: usize },
    /// Everything was delivered but the new cursor could not be stored.
    CursorNotSaved { items: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub subscribers: usize,
    pub notified: usize,
    pub delivered_items: usize,
    pub delivery_failures: usize,
    pub store_failures: usize,
}

impl DispatchReport {
    fn record(&mut self, outcome: &SubscriberOutcome) {
        self.subscribers += 1;
        match outcome {
            SubscriberOutcome::UpToDate => {}
            SubscriberOutcome::Delivered { items, .. } => {
                if *items > 0 {
                    self.notified += 1;
                }
                self.delivered_items += items;
            }
            SubscriberOutcome::DeliveryFailed { delivered } => {
                self.delivery_failures += 1;
                self.delivered_items += delivered;
            }
            SubscriberOutcome::CursorNotSaved { items } => {
                self.store_failures += 1;
                self.delivered_items += items;
            }
        }
    }
}

pub struct Dispatcher {
    store: Arc<dyn SubscriptionStore>,
    channel: Arc<dyn DeliveryChannel>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn SubscriptionStore>, channel: Arc<dyn DeliveryChannel>) -> Self {
        Self { store, channel }
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    /// Runs one notification pass over every stored subscriber.
    ///
    /// Fails only when the subscriber list cannot be read; per-subscriber
    /// problems are counted in the report and retried next pass. A chat with
    /// several matching rows gets each post once per pass.
    pub async fn dispatch(&self, items: &[Item]) -> Result<DispatchReport, StoreError> {
        let subscribers = self.store.list_subscribers().await?;
        let mut report = DispatchReport::default();
        let mut sent: HashMap<i64, HashSet<ItemId>> = HashMap::new();
        for subscriber in &subscribers {
            let sent_to_chat = sent.entry(subscriber.chat_id).or_default();
            let outcome = self.deliver_batch(subscriber, items, sent_to_chat).await;
            report.record(&outcome);
        }
        if report.notified > 0 || report.delivery_failures > 0 || report.store_failures > 0 {
            info!(
                subscribers = report.subscribers,
                notified = report.notified,
                delivered = report.delivered_items,
                delivery_failures = report.delivery_failures,
                store_failures = report.store_failures,
                "notification pass finished"
            );
        }
        Ok(report)
    }

    pub async fn dispatch_subscriber(
        &self,
        subscriber: &Subscriber,
        items: &[Item],
    ) -> SubscriberOutcome {
        self.deliver_batch(subscriber, items, &mut HashSet::new())
            .await
    }

    async fn deliver_batch(
        &self,
        subscriber: &Subscriber,
        items: &[Item],
        sent_to_chat: &mut HashSet<ItemId>,
    ) -> SubscriberOutcome {
        let pending = pending_items(subscriber, items);
        let Some(cursor) = pending.last().map(|item| item.id) else {
            return SubscriberOutcome::UpToDate;
        };

        let mut delivered = 0;
        for item in pending.iter() {
            if sent_to_chat.contains(&item.id) {
                continue;
            }
            if let Err(err) = self.channel.deliver(subscriber.chat_id, item).await {
                warn!(
                    chat_id = subscriber.chat_id,
                    item = item.id,
                    error = %err,
                    "delivery failed, batch will be retried"
                );
                return SubscriberOutcome::DeliveryFailed { delivered };
            }
            sent_to_chat.insert(item.id);
            delivered += 1;
        }

        if let Err(err) = self
            .store
            .advance_cursor(subscriber.chat_id, &subscriber.filter, cursor)
            .await
        {
            warn!(chat_id = subscriber.chat_id, cursor, error = %err, "failed to store cursor");
            return SubscriberOutcome::CursorNotSaved { items: delivered };
        }

        debug!(chat_id = subscriber.chat_id, items = delivered, cursor, "subscriber notified");
        SubscriberOutcome::Delivered {
            items: delivered,
            cursor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub subscriber: Subscriber,
    /// `false` when the chat already followed this address.
    pub created: bool,
}

/// Creates a subscription whose cursor starts at the newest known post, so
/// the chat is only told about posts published from now on.
pub async fn subscribe(
    store: &dyn SubscriptionStore,
    refresher: &Refresher,
    chat_id: i64,
    filter: AddressFilter,
) -> Result<Subscription, SubscribeError> {
    let snapshot = refresher
        .ensure_bootstrapped()
        .await
        .ok_or(SubscribeError::FeedUnavailable)?;
    let last_seen_id = snapshot.top_id().unwrap_or_default();

    let subscriber = Subscriber::new(chat_id, filter, last_seen_id);
    let created = store.add(subscriber.clone()).await?;
    info!(chat_id, address = %subscriber.filter, last_seen_id, created, "subscription saved");
    Ok(Subscription {
        subscriber,
        created,
    })
}
