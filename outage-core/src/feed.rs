use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;

/// Upstream post identifier. Assigned by the feed, increasing over time but
/// not contiguous.
pub type ItemId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub text: String,
    pub published_at: DateTime<Utc>,
}

impl Item {
    pub fn new(id: ItemId, text: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        Self {
            id,
            text: text.into(),
            published_at,
        }
    }

    /// Message body sent to a chat for this post, with the publication date in local time.
    pub fn notification_text(&self) -> String {
        format!(
            "{}\nДата публикации: {}",
            self.text,
            self.published_at
                .with_timezone(&Local)
                .format("%d.%m.%Y %H:%M")
        )
    }
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: ItemId,
    text: String,
    date: i64,
}

impl RawPost {
    fn into_item(self) -> Option<Item> {
        if self.text.trim().is_empty() {
            return None;
        }
        let published_at = DateTime::from_timestamp(self.date, 0)?;
        Some(Item {
            id: self.id,
            text: self.text,
            published_at,
        })
    }
}

/// Decodes a `wall.get` response body.
///
/// Entries that miss a field, carry the wrong type or have no text are dropped
/// one by one; only a body without `response.items` fails as a whole.
pub fn decode_wall(body: &[u8]) -> Result<Vec<Item>, FetchError> {
    let mut payload: Value = serde_json::from_slice(body)?;

    if let Some(error) = payload.get("error") {
        let code = error
            .get("error_code")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let message = error
            .get("error_msg")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_owned();
        return Err(FetchError::Api { code, message });
    }

    let entries = match payload.pointer_mut("/response/items").map(Value::take) {
        Some(Value::Array(entries)) => entries,
        _ => return Err(FetchError::Malformed("missing response.items array")),
    };

    let items = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<RawPost>(entry) {
            Ok(raw) => {
                let id = raw.id;
                let item = raw.into_item();
                if item.is_none() {
                    debug!(index, id, "dropping feed entry without text or valid date");
                }
                item
            }
            Err(err) => {
                debug!(index, error = %err, "dropping malformed feed entry");
                None
            }
        })
        .collect();

    Ok(items)
}
