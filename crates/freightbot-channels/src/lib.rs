//! # Freightbot Channels
//! Chat channel implementations. Telegram is the only transport the bot
//! ships with today.

pub mod telegram;

pub use telegram::{escape_markdown, TelegramChannel, TelegramPollingStream};
