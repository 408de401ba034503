use async_trait::async_trait;
use serde_json::Value;

use crate::{
    client::DiscordClient,
    types::{
        gateway::{
            ChannelDeleteEvent, MessageDeleteEvent, MessageUpdateEvent, ReactionAddEvent,
            ReadyEvent,
        },
        interaction::Interaction,
        message::Message,
    },
};

/// Receives gateway dispatches. Every method defaults to a no-op, so
/// implementors only override what they care about.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Called for *every* dispatch, before the typed callback.
    async fn on_event(&self, _client: &DiscordClient, _name: &str, _data: &Value) {}

    /// Called once per successful identify.
    async fn on_ready(&self, _client: &DiscordClient, _ready: &ReadyEvent) {}

    /// Called when the gateway asks us to drop the session and the client
    /// is about to re-identify.
    async fn on_session_invalidated(&self, _client: &DiscordClient) {}

    async fn on_message(&self, _client: &DiscordClient, _message: &Message) {}

    async fn on_message_update(&self, _client: &DiscordClient, _update: &MessageUpdateEvent) {}

    async fn on_message_delete(&self, _client: &DiscordClient, _delete: &MessageDeleteEvent) {}

    async fn on_reaction_add(&self, _client: &DiscordClient, _reaction: &ReactionAddEvent) {}

    /// Slash commands, component clicks and modal submissions.
    async fn on_interaction(&self, _client: &DiscordClient, _interaction: &Interaction) {}

    async fn on_channel_delete(&self, _client: &DiscordClient, _delete: &ChannelDeleteEvent) {}
}
