use std::sync::Arc;
use std::time::Duration;

use outage_core::dialogue::{SUBSCRIBE_BUTTON, UNSUBSCRIBE_BUTTON};
use outage_core::{
    match_items, subscribe, Action, AddressFilter, DeliveryError, Dialogues, Input, Refresher,
    SubscribeError, SubscriptionStore,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::telegram::{
    CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, TelegramApi, Update,
};

const GREETING: &str = "Привет! Я - бот для оповещения об отключении водоснабжения. \
Введите адрес, чтобы найти объявления, или подпишитесь на уведомления. Пример: Куйбышева 8";
const HELP: &str = "Отправьте адрес (например, «Куйбышева 8»), чтобы найти объявления.\n\
/start - подписаться или отписаться\n\
/list - ваши подписки\n\
/unsubscribe <адрес> - отменить подписку на один адрес\n\
/unsubscribe - отписаться от всех адресов";
const PROMPT_ADDRESS: &str = "Введите адрес для подписки. Пример: Куйбышева 8";
const SUBSCRIBED: &str =
    "✅ Адрес успешно сохранен. Вы будете получать уведомления о новых постах.";
const SUBSCRIBE_FAILED: &str = "❌ Ошибка при сохранении адреса";
const FEED_UNAVAILABLE: &str = "❌ Не удалось получить объявления, попробуйте позже";
const UNSUBSCRIBED: &str = "✅ Вы успешно отписались от рассылки";
const UNSUBSCRIBE_FAILED: &str = "❌ Ошибка при отписке";
const NO_SUBSCRIPTIONS: &str = "У вас нет подписок";
const ADDRESS_NOT_FOUND: &str = "❌ Адрес не найден";
const INVALID_ADDRESS: &str = "❌ Введите корректный адрес";
const UNKNOWN_COMMAND: &str = "Неизвестная команда. Список команд: /help";

const RETRY_DELAY: Duration = Duration::from_secs(5);

pub fn menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![
            InlineKeyboardButton::callback("Подписаться", SUBSCRIBE_BUTTON),
            InlineKeyboardButton::callback("Отписаться", UNSUBSCRIBE_BUTTON),
        ]],
    }
}

/// Routes Telegram updates through the per-chat dialogue.
pub struct Bot {
    api: Arc<TelegramApi>,
    store: Arc<dyn SubscriptionStore>,
    refresher: Arc<Refresher>,
    dialogues: Dialogues,
}

impl Bot {
    pub fn new(
        api: Arc<TelegramApi>,
        store: Arc<dyn SubscriptionStore>,
        refresher: Arc<Refresher>,
    ) -> Self {
        Self {
            api,
            store,
            refresher,
            dialogues: Dialogues::new(),
        }
    }

    pub fn dialogues(&self) -> &Dialogues {
        &self.dialogues
    }

    /// Long-polls Telegram until `shutdown` fires. Updates are handled one at
    /// a time so a chat's messages are applied in order.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut offset = 0;
        loop {
            let updates = tokio::select! {
                _ = shutdown.recv() => {
                    info!("bot shutdown requested");
                    break;
                }
                updates = self.api.get_updates(offset) => updates,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "getUpdates failed");
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }
    }

    pub async fn handle_update(&self, update: Update) {
        if let Some(message) = update.message {
            self.handle_message(message).await;
        } else if let Some(query) = update.callback_query {
            self.handle_callback(query).await;
        } else {
            debug!(update_id = update.update_id, "ignoring unsupported update");
        }
    }

    async fn handle_message(&self, message: Message) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let chat_id = message.chat.id;
        let user = message
            .from
            .as_ref()
            .and_then(|user| user.username.as_deref())
            .unwrap_or_default();
        info!(chat_id, user, text, "incoming message");

        let action = self.dialogues.advance(chat_id, Input::from_message(text)).await;
        self.perform(chat_id, action).await;
    }

    async fn handle_callback(&self, query: CallbackQuery) {
        if let Err(err) = self.api.answer_callback_query(&query.id).await {
            warn!(error = %err, "failed to answer callback query");
        }
        let chat_id = query
            .message
            .as_ref()
            .map(|message| message.chat.id)
            .unwrap_or(query.from.id);
        let Some(input) = query.data.as_deref().and_then(Input::from_callback) else {
            debug!(chat_id, data = ?query.data, "unknown callback data");
            return;
        };
        let action = self.dialogues.advance(chat_id, input).await;
        self.perform(chat_id, action).await;
    }

    async fn perform(&self, chat_id: i64, action: Action) {
        let result = match action {
            Action::Greet => {
                self.api
                    .send_message(chat_id, GREETING, Some(&menu_keyboard()))
                    .await
            }
            Action::Help => self.reply(chat_id, HELP).await,
            Action::PromptAddress => self.reply(chat_id, PROMPT_ADDRESS).await,
            Action::ListSubscriptions => self.list_subscriptions(chat_id).await,
            Action::UnsubscribeAll => self.unsubscribe_all(chat_id).await,
            Action::UnsubscribeAddress(filter) => self.unsubscribe_address(chat_id, &filter).await,
            Action::Subscribe(filter) => self.subscribe(chat_id, filter).await,
            Action::Lookup(filter) => self.lookup(chat_id, &filter).await,
            Action::InvalidAddress => self.reply(chat_id, INVALID_ADDRESS).await,
            Action::UnknownCommand => self.reply(chat_id, UNKNOWN_COMMAND).await,
        };
        if let Err(err) = result {
            warn!(chat_id, error = %err, "failed to reply");
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        self.api.send_message(chat_id, text, None).await
    }

    async fn list_subscriptions(&self, chat_id: i64) -> Result<(), DeliveryError> {
        let rows = match self.store.list_for_chat(chat_id).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(chat_id, error = %err, "failed to list subscriptions");
                return self.reply(chat_id, SUBSCRIBE_FAILED).await;
            }
        };
        if rows.is_empty() {
            return self.reply(chat_id, NO_SUBSCRIPTIONS).await;
        }
        let lines: Vec<String> = rows
            .iter()
            .map(|row| format!("• {}", row.filter))
            .collect();
        self.reply(chat_id, &format!("Ваши подписки:\n{}", lines.join("\n")))
            .await
    }

    async fn unsubscribe_all(&self, chat_id: i64) -> Result<(), DeliveryError> {
        match self.store.remove_chat(chat_id).await {
            Ok(removed) => {
                info!(chat_id, removed, "chat unsubscribed");
                self.reply(chat_id, UNSUBSCRIBED).await
            }
            Err(err) => {
                warn!(chat_id, error = %err, "failed to unsubscribe");
                self.reply(chat_id, UNSUBSCRIBE_FAILED).await
            }
        }
    }

    async fn unsubscribe_address(
        &self,
        chat_id: i64,
        filter: &AddressFilter,
    ) -> Result<(), DeliveryError> {
        match self.store.remove_address(chat_id, filter).await {
            Ok(0) => {
                self.reply(chat_id, &format!("❌ Подписка на адрес «{filter}» не найдена"))
                    .await
            }
            Ok(_) => {
                self.reply(chat_id, &format!("✅ Подписка на адрес «{filter}» отменена"))
                    .await
            }
            Err(err) => {
                warn!(chat_id, error = %err, "failed to remove address");
                self.reply(chat_id, UNSUBSCRIBE_FAILED).await
            }
        }
    }

    async fn subscribe(&self, chat_id: i64, filter: AddressFilter) -> Result<(), DeliveryError> {
        match subscribe(self.store.as_ref(), &self.refresher, chat_id, filter).await {
            Ok(subscription) if subscription.created => self.reply(chat_id, SUBSCRIBED).await,
            Ok(subscription) => {
                let text = format!(
                    "ℹ️ Вы уже подписаны на адрес «{}»",
                    subscription.subscriber.filter
                );
                self.reply(chat_id, &text).await
            }
            Err(SubscribeError::FeedUnavailable) => self.reply(chat_id, FEED_UNAVAILABLE).await,
            Err(err) => {
                warn!(chat_id, error = %err, "failed to save subscription");
                self.reply(chat_id, SUBSCRIBE_FAILED).await
            }
        }
    }

    /// Sends every cached post mentioning the address, oldest first.
    async fn lookup(&self, chat_id: i64, filter: &AddressFilter) -> Result<(), DeliveryError> {
        let Some(snapshot) = self.refresher.ensure_bootstrapped().await else {
            return self.reply(chat_id, FEED_UNAVAILABLE).await;
        };
        let found = match_items(snapshot.items().iter().rev(), filter);
        if found.is_empty() {
            return self.reply(chat_id, ADDRESS_NOT_FOUND).await;
        }
        for item in &found {
            self.reply(chat_id, &item.notification_text()).await?;
        }
        Ok(())
    }
}
