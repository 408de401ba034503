//! # Ticket bot
//!
//! Keeps Discord support channels in step with tickets persisted in a
//! SQLite store. A reconciler creates and tears down one private channel
//! per open ticket, a relay delivers stored messages into those channels,
//! and the gateway handler mirrors channel traffic back into the store.
//! Suggestion voting and admin-ping timeouts ride along on the same bot.

pub mod config;
pub mod embeds;
pub mod error;
pub mod handler;
pub mod interactions;
pub mod logging;
pub mod mirror;
pub mod model;
pub mod moderation;
pub mod provider;
pub mod reconciler;
pub mod relay;
pub mod scheduler;
pub mod store;
pub mod suggestions;
pub mod tickets;
pub mod transcript;

#[cfg(test)]
mod testing;

pub use config::BotConfig;
pub use error::{BotError, BotResult};
