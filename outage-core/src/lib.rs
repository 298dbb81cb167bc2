pub mod address;
pub mod cache;
pub mod client;
pub mod config;
pub mod dialogue;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod matcher;
pub mod poller;
pub mod storage;

pub use address::parse_address;
pub use cache::{Snapshot, SnapshotCache};
pub use client::{FeedSource, VkWallClient};
pub use config::AppConfig;
pub use dialogue::{Action, ConversationState, Dialogues, Input};
pub use diff::{reconcile, Reconciliation, Refresher};
pub use dispatch::{pending_items, subscribe, DeliveryChannel, DispatchReport, Dispatcher};
pub use dispatch::{SubscriberOutcome, Subscription};
pub use error::{ConfigError, DeliveryError, FetchError, PollError, StoreError, SubscribeError};
pub use feed::{decode_wall, Item, ItemId};
pub use matcher::{match_items, AddressFilter};
pub use poller::{poll_once, spawn_poller, CycleReport, PollConfig, PollerHandle};
pub use storage::{JsonSubscriptionStore, Subscriber, SubscriptionStore};
