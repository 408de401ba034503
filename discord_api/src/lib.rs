//! # Discord API
//!
//! An asynchronous Rust client for the parts of the Discord API a guild bot
//! needs: REST endpoints for channels, messages, members and interactions,
//! plus a gateway connection that dispatches events to an [`EventHandler`].
//! It uses `tokio` for the async runtime, `reqwest` for HTTP and
//! `tokio-tungstenite` for the gateway socket.

pub mod client;
pub mod error;
pub mod util;
pub mod api;
pub mod gateway;
pub mod types;

pub use client::*;
pub use types::*;
pub use gateway::*;
pub use error::DiscordError;
