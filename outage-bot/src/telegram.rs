use std::time::Duration;

use async_trait::async_trait;
use outage_core::config::TelegramConfig;
use outage_core::{DeliveryChannel, DeliveryError, Item};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

/// Telegram rejects longer message texts.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: data.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

/// Minimal Bot API client: long polling, messages, callback answers.
#[derive(Debug, Clone)]
pub struct TelegramApi {
    client: Client,
    base: Url,
    long_poll: Duration,
}

impl TelegramApi {
    pub fn new(client: Client, config: &TelegramConfig) -> Result<Self, url::ParseError> {
        // tokens contain ':', so they cannot go through Url::join as a relative path
        let base = Url::parse(&format!(
            "{}/bot{}/",
            config.api_base.trim_end_matches('/'),
            config.token
        ))?;
        Ok(Self {
            client,
            base,
            long_poll: Duration::from_secs(config.long_poll_seconds),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<T, DeliveryError> {
        let url = self.base.join(method).map_err(|err| DeliveryError::Api {
            code: 0,
            message: err.to_string(),
        })?;
        let response: ApiResponse<T> = self
            .client
            .post(url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            other => Err(DeliveryError::Api {
                code: other.error_code.unwrap_or_default(),
                message: other
                    .description
                    .unwrap_or_else(|| format!("{method} returned no result")),
            }),
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    pub async fn get_me(&self) -> Result<User, DeliveryError> {
        self.call("getMe", json!({}), self.request_timeout()).await
    }

    /// Long-polls for updates starting at `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, DeliveryError> {
        let body = json!({
            "offset": offset,
            "timeout": self.long_poll.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", body, self.long_poll + self.request_timeout())
            .await
    }

    /// Sends `text`, split into several messages when it exceeds the Bot API limit.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), DeliveryError> {
        let chunks = split_message(text, MAX_MESSAGE_CHARS);
        let last = chunks.len().saturating_sub(1);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut body = json!({ "chat_id": chat_id, "text": chunk });
            if let (Some(keyboard), true) = (keyboard, index == last) {
                body["reply_markup"] = json!(keyboard);
            }
            let _: serde_json::Value = self
                .call("sendMessage", body, self.request_timeout())
                .await?;
        }
        debug!(chat_id, "message sent");
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), DeliveryError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({ "callback_query_id": callback_query_id }),
                self.request_timeout(),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryChannel for TelegramApi {
    async fn deliver(&self, chat_id: i64, item: &Item) -> Result<(), DeliveryError> {
        self.send_message(chat_id, &item.notification_text(), None)
            .await
    }
}

/// Splits on character boundaries into pieces of at most `limit` chars.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_owned()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}
