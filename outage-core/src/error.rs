use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("feed request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("feed api error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("malformed feed payload: {0}")]
    Malformed(&'static str),
    #[error("feed decoding error: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("subscription store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("subscription store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("delivery rejected ({code}): {message}")]
    Api { code: i64, message: String },
}

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("feed is unavailable, cannot seed the subscription cursor")]
    FeedUnavailable,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parsing error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unable to locate the user configuration directory")]
    MissingDirectory,
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("poller task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
