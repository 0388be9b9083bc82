//! Telegram host for the Tally expense pipeline.
//!
//! Long-polls the Bot API, routes each message to a [`tally_pipeline::Pipeline`]
//! task, and replies with the rendered summary.

#![warn(missing_docs)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod telegram;

pub use config::{BotConfig, Cli, ConfigError};
pub use dispatch::{route, Bot, Route, SHUTDOWN_GRACE, START_REPLY};
pub use error::{BotError, Result};
pub use telegram::TelegramClient;
