use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::config::FeedConfig;
use crate::error::FetchError;
use crate::feed::{decode_wall, Item};

/// Source of the full upstream post list, newest first.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_items(&self) -> Result<Vec<Item>, FetchError>;
}

/// Pulls a community wall through the VK `wall.get` method.
#[derive(Debug, Clone)]
pub struct VkWallClient {
    client: Client,
    endpoint: Url,
    request_timeout: Duration,
    retry_attempts: u8,
    retry_backoff: Duration,
}

impl VkWallClient {
    pub fn new(client: Client, config: &FeedConfig) -> Result<Self, url::ParseError> {
        let mut endpoint = Url::parse(&config.api_base)?.join("method/wall.get")?;
        endpoint
            .query_pairs_mut()
            .append_pair("access_token", &config.access_token)
            .append_pair("v", &config.api_version)
            .append_pair("domain", &config.domain);

        Ok(Self {
            client,
            endpoint,
            request_timeout: config.request_timeout(),
            retry_attempts: config.retry_attempts.max(1),
            retry_backoff: config.retry_backoff(),
        })
    }

    async fn fetch_once(&self) -> Result<Vec<Item>, FetchError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .timeout(self.request_timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| self.classify(err))?;
        let bytes = response.bytes().await.map_err(|err| self.classify(err))?;
        decode_wall(&bytes)
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.request_timeout)
        } else {
            FetchError::Network(err)
        }
    }
}

#[async_trait]
impl FeedSource for VkWallClient {
    async fn fetch_items(&self) -> Result<Vec<Item>, FetchError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once().await {
                Ok(items) => {
                    debug!(count = items.len(), attempt, "fetched wall posts");
                    return Ok(items);
                }
                Err(err @ (FetchError::Network(_) | FetchError::Timeout(_)))
                    if attempt < self.retry_attempts =>
                {
                    warn!(error = %err, attempt, "wall fetch failed, retrying");
                    tokio::time::sleep(self.retry_backoff * u32::from(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
