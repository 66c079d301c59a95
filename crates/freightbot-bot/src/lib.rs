//! # Freightbot Bot
//! The foreground command surface: parses chat commands and answers them
//! from the order directory. Thin glue by design — all scheduling and
//! delivery logic lives in `freightbot-notify`.

pub mod commands;
pub mod fmt;
pub mod handlers;

pub use commands::{parse_command, Command};
pub use handlers::{handle_message, BotContext};
