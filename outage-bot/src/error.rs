use outage_core::{ConfigError, DeliveryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("telegram token is not configured")]
    MissingToken,
    #[error("invalid api url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram authorization failed: {0}")]
    Telegram(#[from] DeliveryError),
}
