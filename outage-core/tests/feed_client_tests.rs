use std::sync::Arc;

use outage_core::config::FeedConfig;
use outage_core::{
    decode_wall, FeedSource, FetchError, Reconciliation, Refresher, SnapshotCache, VkWallClient,
};
use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn feed_config(server: &MockServer) -> FeedConfig {
    FeedConfig {
        api_base: server.uri(),
        access_token: "service-key".into(),
        api_version: "5.199".into(),
        domain: "tambov_water".into(),
        request_timeout_seconds: 1,
        retry_attempts: 1,
        retry_backoff_ms: 10,
    }
}

fn wall_body() -> serde_json::Value {
    json!({
        "response": {
            "count": 4,
            "items": [
                { "id": 31, "text": "Отключение воды: Куйбышева 8", "date": 1_700_000_300 },
                { "id": 30, "date": 1_700_000_200 },
                { "id": 29, "text": "", "date": 1_700_000_100 },
                { "id": "bogus", "text": "Авария", "date": 1_700_000_050 },
                { "id": 27, "text": "Авария на Советской", "date": 1_700_000_000 }
            ]
        }
    })
}

#[tokio::test]
async fn fetch_decodes_wall_and_drops_bad_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/method/wall.get"))
        .and(query_param("domain", "tambov_water"))
        .and(query_param("access_token", "service-key"))
        .and(query_param("v", "5.199"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wall_body()))
        .mount(&server)
        .await;

    let client = VkWallClient::new(Client::new(), &feed_config(&server)).unwrap();
    let items = client.fetch_items().await.unwrap();

    let ids: Vec<u64> = items.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![31, 27]);
    assert_eq!(items[0].published_at.timestamp(), 1_700_000_300);
}

#[tokio::test]
async fn api_error_body_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/method/wall.get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": { "error_code": 5, "error_msg": "User authorization failed" }
        })))
        .mount(&server)
        .await;

    let client = VkWallClient::new(Client::new(), &feed_config(&server)).unwrap();
    let err = client.fetch_items().await.unwrap_err();

    assert!(matches!(err, FetchError::Api { code: 5, .. }), "got {err:?}");
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/method/wall.get"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/method/wall.get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wall_body()))
        .mount(&server)
        .await;

    let config = FeedConfig {
        retry_attempts: 3,
        ..feed_config(&server)
    };
    let client = VkWallClient::new(Client::new(), &config).unwrap();

    assert_eq!(client.fetch_items().await.unwrap().len(), 2);
}

#[tokio::test]
async fn timeout_degrades_to_a_touch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/method/wall.get"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(wall_body())
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = VkWallClient::new(Client::new(), &feed_config(&server)).unwrap();
    assert!(matches!(
        client.fetch_items().await,
        Err(FetchError::Timeout(_))
    ));

    let cache = SnapshotCache::default();
    cache
        .replace(vec![outage_core::Item::new(
            10,
            "старый пост",
            chrono::Utc::now(),
        )])
        .await;
    let refresher = Refresher::new(Arc::new(client), cache.clone());

    assert_eq!(refresher.refresh().await, Reconciliation::Unchanged);
    assert_eq!(cache.get().await.unwrap().top_id(), Some(10));
}

#[test]
fn body_without_items_is_malformed() {
    let err = decode_wall(br#"{"response": {"count": 0}}"#).unwrap_err();
    assert!(matches!(err, FetchError::Malformed(_)));

    let err = decode_wall(b"<html>").unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[test]
fn empty_wall_decodes_to_no_items() {
    let items = decode_wall(br#"{"response": {"count": 0, "items": []}}"#).unwrap();
    assert!(items.is_empty());
}
