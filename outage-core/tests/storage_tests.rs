mod common;

use common::temp_dir;
use outage_core::{AddressFilter, JsonSubscriptionStore, Subscriber, SubscriptionStore};

#[tokio::test]
async fn subscriptions_survive_reload() {
    let dir = temp_dir("outage_store");
    let path = dir.join("subscriptions.json");

    let store = JsonSubscriptionStore::load_from(&path).await;
    store
        .add(Subscriber::new(42, AddressFilter::new("Куйбышева", "8"), 100))
        .await
        .unwrap();
    store
        .advance_cursor(42, &AddressFilter::new("Куйбышева", "8"), 120)
        .await
        .unwrap();

    let reopened = JsonSubscriptionStore::load_from(&path).await;
    let rows = reopened.list_subscribers().await.unwrap();
    assert_eq!(rows, vec![Subscriber::new(42, AddressFilter::new("Куйбышева", "8"), 120)]);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn corrupted_file_falls_back_to_tmp_copy() {
    let dir = temp_dir("outage_store_corrupt");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join("subscriptions.json");
    tokio::fs::write(&path, b"{ not json").await.unwrap();
    let tmp = serde_json::json!({
        "subscriptions": [
            { "chat_id": 7, "street": "Советская", "number": "", "last_seen_id": 5 }
        ]
    });
    tokio::fs::write(dir.join("subscriptions.json.tmp"), serde_json::to_vec(&tmp).unwrap())
        .await
        .unwrap();

    let store = JsonSubscriptionStore::load_from(&path).await;

    let rows = store.list_for_chat(7).await.unwrap();
    assert_eq!(rows.len(), 1, "should fall back to tmp file when main is corrupted");
    assert_eq!(rows[0].filter, AddressFilter::new("Советская", ""));

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn duplicate_address_is_not_added_twice() {
    let store = JsonSubscriptionStore::in_memory();
    let row = Subscriber::new(1, AddressFilter::new("Куйбышева", "8"), 3);

    assert!(store.add(row.clone()).await.unwrap());
    assert!(!store.add(Subscriber { last_seen_id: 9, ..row }).await.unwrap());

    let rows = store.list_subscribers().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].last_seen_id, 3);
}

#[tokio::test]
async fn duplicate_check_ignores_case() {
    let store = JsonSubscriptionStore::in_memory();

    assert!(store
        .add(Subscriber::new(1, AddressFilter::new("Куйбышева", "8А"), 3))
        .await
        .unwrap());
    assert!(!store
        .add(Subscriber::new(1, AddressFilter::new("куйбышева", "8а"), 3))
        .await
        .unwrap());
    assert!(store
        .add(Subscriber::new(2, AddressFilter::new("куйбышева", "8а"), 3))
        .await
        .unwrap());

    assert_eq!(store.list_for_chat(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn remove_address_without_number_drops_the_whole_street() {
    let store = JsonSubscriptionStore::in_memory();
    for number in ["8", "10"] {
        store
            .add(Subscriber::new(1, AddressFilter::new("Куйбышева", number), 0))
            .await
            .unwrap();
    }
    store
        .add(Subscriber::new(1, AddressFilter::new("Советская", "5"), 0))
        .await
        .unwrap();
    store
        .add(Subscriber::new(2, AddressFilter::new("Куйбышева", "8"), 0))
        .await
        .unwrap();

    let removed = store
        .remove_address(1, &AddressFilter::new("куйбышева", ""))
        .await
        .unwrap();

    assert_eq!(removed, 2);
    assert_eq!(store.list_for_chat(1).await.unwrap().len(), 1);
    assert_eq!(store.list_for_chat(2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn remove_chat_drops_every_row_of_the_chat() {
    let store = JsonSubscriptionStore::in_memory();
    store
        .add(Subscriber::new(1, AddressFilter::new("Куйбышева", "8"), 0))
        .await
        .unwrap();
    store
        .add(Subscriber::new(1, AddressFilter::new("Советская", ""), 0))
        .await
        .unwrap();

    assert_eq!(store.remove_chat(1).await.unwrap(), 2);
    assert_eq!(store.remove_chat(1).await.unwrap(), 0);
    assert!(store.list_subscribers().await.unwrap().is_empty());
}

#[tokio::test]
async fn cursor_of_removed_subscription_is_ignored() {
    let store = JsonSubscriptionStore::in_memory();
    store
        .advance_cursor(9, &AddressFilter::new("Советская", ""), 50)
        .await
        .unwrap();
    assert!(store.list_subscribers().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_persist_keeps_previous_state() {
    let dir = temp_dir("outage_store_readonly");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    // a directory where the file should be makes the rename fail
    let path = dir.join("subscriptions.json");
    tokio::fs::create_dir_all(path.join("blocker")).await.unwrap();

    let store = JsonSubscriptionStore::load_from(&path).await;
    let result = store
        .add(Subscriber::new(1, AddressFilter::new("Куйбышева", "8"), 0))
        .await;

    assert!(result.is_err());
    assert!(store.list_subscribers().await.unwrap().is_empty());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}
