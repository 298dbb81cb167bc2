//! Per-chat conversation state for the bot front end.
//!
//! [`transition`] is pure: it maps the current state and an incoming message
//! to the next state and the [`Action`] the bot should carry out.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::address::parse_address;
use crate::matcher::AddressFilter;

pub const SUBSCRIBE_BUTTON: &str = "subscribe";
pub const UNSUBSCRIBE_BUTTON: &str = "unsubscribe";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversationState {
    #[default]
    Idle,
    /// The chat pressed "subscribe"; the next free text is the address.
    AwaitingAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Start,
    Help,
    List,
    /// `/unsubscribe` with the optional address that followed it.
    UnsubscribeCommand(String),
    UnknownCommand(String),
    SubscribeButton,
    UnsubscribeButton,
    Text(String),
}

impl Input {
    pub fn from_message(text: &str) -> Self {
        let text = text.trim();
        let Some(command_line) = text.strip_prefix('/') else {
            return Input::Text(text.to_owned());
        };
        let (command, args) = command_line
            .split_once(char::is_whitespace)
            .unwrap_or((command_line, ""));
        // group chats address commands as /start@BotName
        let command = command.split('@').next().unwrap_or_default();
        match command {
            "start" => Input::Start,
            "help" => Input::Help,
            "list" => Input::List,
            "unsubscribe" => Input::UnsubscribeCommand(args.trim().to_owned()),
            other => Input::UnknownCommand(other.to_owned()),
        }
    }

    pub fn from_callback(data: &str) -> Option<Self> {
        match data {
            SUBSCRIBE_BUTTON => Some(Input::SubscribeButton),
            UNSUBSCRIBE_BUTTON => Some(Input::UnsubscribeButton),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Greet,
    Help,
    PromptAddress,
    ListSubscriptions,
    UnsubscribeAll,
    UnsubscribeAddress(AddressFilter),
    Subscribe(AddressFilter),
    Lookup(AddressFilter),
    InvalidAddress,
    UnknownCommand,
}

pub fn transition(state: ConversationState, input: Input) -> (ConversationState, Action) {
    use ConversationState::{AwaitingAddress, Idle};

    match input {
        Input::Start => (Idle, Action::Greet),
        Input::Help => (Idle, Action::Help),
        Input::List => (Idle, Action::ListSubscriptions),
        Input::UnknownCommand(_) => (state, Action::UnknownCommand),
        Input::SubscribeButton => (AwaitingAddress, Action::PromptAddress),
        Input::UnsubscribeButton => (Idle, Action::UnsubscribeAll),
        Input::UnsubscribeCommand(args) if args.is_empty() => (Idle, Action::UnsubscribeAll),
        Input::UnsubscribeCommand(args) => match parse_address(&args) {
            Some(filter) => (Idle, Action::UnsubscribeAddress(filter)),
            None => (Idle, Action::InvalidAddress),
        },
        Input::Text(text) => match (state, parse_address(&text)) {
            (AwaitingAddress, Some(filter)) => (Idle, Action::Subscribe(filter)),
            (Idle, Some(filter)) => (Idle, Action::Lookup(filter)),
            (state, None) => (state, Action::InvalidAddress),
        },
    }
}

/// Conversation states of every chat; chats without an entry are idle.
#[derive(Debug, Clone, Default)]
pub struct Dialogues {
    states: Arc<RwLock<HashMap<i64, ConversationState>>>,
}

impl Dialogues {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self, chat_id: i64) -> ConversationState {
        self.states
            .read()
            .await
            .get(&chat_id)
            .copied()
            .unwrap_or_default()
    }

    /// Applies `input` to the chat's state and returns what to do about it.
    pub async fn advance(&self, chat_id: i64, input: Input) -> Action {
        let mut states = self.states.write().await;
        let current = states.get(&chat_id).copied().unwrap_or_default();
        let (next, action) = transition(current, input);
        match next {
            ConversationState::Idle => {
                states.remove(&chat_id);
            }
            other => {
                states.insert(chat_id, other);
            }
        }
        action
    }
}
