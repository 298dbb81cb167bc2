pub mod error;
pub mod handler;
pub mod telegram;

pub use error::StartupError;
pub use handler::{menu_keyboard, Bot};
pub use telegram::{split_message, TelegramApi, Update};
