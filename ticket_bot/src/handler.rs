//! The single gateway event handler. Anything that talks to Discord more
//! than once runs on its own task so the gateway read loop keeps moving.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use discord_api::{
    types::gateway::{
        ChannelDeleteEvent, MessageDeleteEvent, MessageUpdateEvent, ReactionAddEvent, ReadyEvent,
    },
    DiscordClient, EventHandler, Interaction, InteractionsApi, Message,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::BotConfig,
    interactions::{self, InteractionRouter},
    mirror::InboundMirror,
    moderation,
    reconciler::Nudge,
    store::TicketStore,
    suggestions::SuggestionService,
};

pub struct BotHandler {
    config: Arc<BotConfig>,
    store: Arc<dyn TicketStore>,
    mirror: InboundMirror,
    router: InteractionRouter,
    suggestions: Arc<SuggestionService>,
    nudge: Nudge,
}

impl BotHandler {
    pub fn new(
        config: Arc<BotConfig>,
        store: Arc<dyn TicketStore>,
        router: InteractionRouter,
        suggestions: Arc<SuggestionService>,
        nudge: Nudge,
    ) -> Self {
        Self {
            mirror: InboundMirror::new(store.clone()),
            config,
            store,
            router,
            suggestions,
            nudge,
        }
    }

    fn in_our_guild(&self, guild_id: Option<&str>) -> bool {
        guild_id == Some(self.config.guild_id.as_str())
    }
}

#[async_trait]
impl EventHandler for BotHandler {
    async fn on_ready(&self, client: &DiscordClient, ready: &ReadyEvent) {
        info!(user = %ready.user.username, session = %ready.session_id, "bot ready");
        match client
            .bulk_overwrite_guild_commands(
                &ready.application.id,
                &self.config.guild_id,
                &interactions::commands(),
            )
            .await
        {
            Ok(registered) => info!(count = registered.len(), "guild commands registered"),
            Err(e) => error!(error = %e, "failed to register guild commands"),
        }
        // Channels may have changed while we were away.
        self.nudge.nudge();
    }

    async fn on_message(&self, client: &DiscordClient, message: &Message) {
        if !self.in_our_guild(message.guild_id.as_deref()) {
            return;
        }
        if moderation::should_timeout(&self.config, message) {
            let client = client.clone();
            let config = self.config.clone();
            let message = message.clone();
            tokio::spawn(async move {
                if let Err(e) = moderation::enforce(&client, &config, &message, Utc::now()).await {
                    warn!(user = %message.author.id, error = %e, "timeout enforcement failed");
                }
            });
            return;
        }
        // Inline so creates, edits and deletes of one message stay ordered.
        if let Err(e) = self.mirror.on_message(message, Utc::now()).await {
            warn!(message_id = %message.id, channel_id = %message.channel_id, error = %e, "failed to mirror message");
        }
    }

    async fn on_message_update(&self, _client: &DiscordClient, update: &MessageUpdateEvent) {
        if !self.in_our_guild(update.guild_id.as_deref()) {
            return;
        }
        if let Err(e) = self.mirror.on_update(update).await {
            warn!(message_id = %update.id, error = %e, "failed to mirror edit");
        }
    }

    async fn on_message_delete(&self, _client: &DiscordClient, delete: &MessageDeleteEvent) {
        if !self.in_our_guild(delete.guild_id.as_deref()) {
            return;
        }
        if let Err(e) = self.mirror.on_delete(delete).await {
            warn!(message_id = %delete.id, error = %e, "failed to mirror delete");
        }
    }

    async fn on_reaction_add(&self, _client: &DiscordClient, reaction: &ReactionAddEvent) {
        if !self.in_our_guild(reaction.guild_id.as_deref()) {
            return;
        }
        let suggestions = self.suggestions.clone();
        let reaction = reaction.clone();
        tokio::spawn(async move {
            if let Err(e) = suggestions.on_reaction(&reaction, Utc::now()).await {
                warn!(message_id = %reaction.message_id, error = %e, "failed to police vote");
            }
        });
    }

    async fn on_interaction(&self, _client: &DiscordClient, interaction: &Interaction) {
        let router = self.router.clone();
        let interaction = interaction.clone();
        tokio::spawn(async move { router.handle(&interaction).await });
    }

    async fn on_channel_delete(&self, _client: &DiscordClient, delete: &ChannelDeleteEvent) {
        match self.store.find_ticket_by_channel(&delete.id).await {
            Ok(Some(ticket)) => {
                debug!(ticket_id = ticket.id, channel_id = %delete.id, "ticket channel deleted");
                self.nudge.nudge();
            }
            Ok(None) => {}
            Err(e) => warn!(channel_id = %delete.id, error = %e, "channel lookup failed"),
        }
    }
}
