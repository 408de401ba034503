//! Channel provisioning and message delivery seen from the reconciler and
//! the relay.

use async_trait::async_trait;
use chrono::Utc;
use discord_api::{
    api::guilds::MEMBER_PAGE_LIMIT,
    types::channel::GUILD_TEXT,
    AllowedMentions, ChannelsApi, CreateGuildChannel, CreateMessage, DiscordClient, GuildsApi,
    MessagesApi, PermissionOverwrite, Permissions, User,
};
use tracing::{debug, warn};

use crate::{embeds, error::BotError, model::Ticket};

/// Access granted on a new ticket channel, on top of the default-deny
/// baseline and the support role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelAcl {
    pub topic: String,
    pub allowed_users: Vec<String>,
}

/// A guild member under every name a sender might use for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownMember {
    pub id: String,
    pub names: Vec<String>,
}

#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Ref of the live text channel with this name, if any.
    async fn channel_exists(&self, name: &str) -> Result<Option<String>, BotError>;

    async fn create_channel(&self, name: &str, acl: &ChannelAcl) -> Result<String, BotError>;

    /// `BotError::NotFound` when the channel is already gone.
    async fn delete_channel(&self, channel_ref: &str) -> Result<(), BotError>;

    async fn send_text(&self, channel_ref: &str, text: &str) -> Result<(), BotError>;

    async fn send_attachment(&self, channel_ref: &str, url: &str) -> Result<(), BotError>;

    /// Intro embed plus Close / Reassign Owner buttons.
    async fn send_ticket_intro(&self, channel_ref: &str, ticket: &Ticket) -> Result<(), BotError>;

    async fn send_file(
        &self,
        channel_ref: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<(), BotError>;

    async fn list_members(&self) -> Result<Vec<KnownMember>, BotError>;
}

/// Ticket channel permissions granted to the owner and support staff.
pub fn ticket_access() -> Permissions {
    Permissions::VIEW_CHANNEL
        | Permissions::SEND_MESSAGES
        | Permissions::READ_MESSAGE_HISTORY
        | Permissions::ATTACH_FILES
        | Permissions::EMBED_LINKS
}

#[derive(Clone)]
pub struct DiscordChannelProvider {
    client: DiscordClient,
    guild_id: String,
    support_role_id: String,
    support_category_id: String,
}

impl DiscordChannelProvider {
    pub fn new(
        client: DiscordClient,
        guild_id: impl Into<String>,
        support_role_id: impl Into<String>,
        support_category_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            guild_id: guild_id.into(),
            support_role_id: support_role_id.into(),
            support_category_id: support_category_id.into(),
        }
    }

    fn overwrites(&self, acl: &ChannelAcl) -> Vec<PermissionOverwrite> {
        // The @everyone role shares the guild's id.
        let mut overwrites = vec![
            PermissionOverwrite::deny_role(&self.guild_id, Permissions::VIEW_CHANNEL),
            PermissionOverwrite::allow_role(&self.support_role_id, ticket_access()),
        ];
        overwrites.extend(
            acl.allowed_users
                .iter()
                .map(|user| PermissionOverwrite::allow_member(user, ticket_access())),
        );
        overwrites
    }

    async fn owner(&self, ticket: &Ticket) -> Option<User> {
        let owner_ref = ticket.owner_ref.as_deref()?;
        match self.client.get_user(owner_ref).await {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(ticket_id = ticket.id, owner = owner_ref, error = %e, "could not load ticket owner");
                None
            }
        }
    }
}

#[async_trait]
impl ChannelProvider for DiscordChannelProvider {
    async fn channel_exists(&self, name: &str) -> Result<Option<String>, BotError> {
        let channels = self.client.list_guild_channels(&self.guild_id).await?;
        Ok(channels
            .into_iter()
            .find(|c| c.kind == GUILD_TEXT && c.name.as_deref() == Some(name))
            .map(|c| c.id))
    }

    async fn create_channel(&self, name: &str, acl: &ChannelAcl) -> Result<String, BotError> {
        let body = CreateGuildChannel {
            name: name.to_string(),
            kind: GUILD_TEXT,
            topic: Some(acl.topic.clone()),
            parent_id: Some(self.support_category_id.clone()),
            permission_overwrites: self.overwrites(acl),
        };
        let channel = self.client.create_guild_channel(&self.guild_id, &body).await?;
        debug!(channel_id = %channel.id, name, "created channel");
        Ok(channel.id)
    }

    async fn delete_channel(&self, channel_ref: &str) -> Result<(), BotError> {
        self.client.delete_channel(channel_ref).await?;
        Ok(())
    }

    async fn send_text(&self, channel_ref: &str, text: &str) -> Result<(), BotError> {
        // Resolved `<@id>` mentions may ping users; roles and @everyone never.
        let body = CreateMessage {
            allowed_mentions: Some(AllowedMentions {
                parse: vec!["users".to_string()],
                ..Default::default()
            }),
            ..CreateMessage::text(text)
        };
        self.client.create_message(channel_ref, body).await?;
        Ok(())
    }

    async fn send_attachment(&self, channel_ref: &str, url: &str) -> Result<(), BotError> {
        self.client.send_message(channel_ref, url).await?;
        Ok(())
    }

    async fn send_ticket_intro(&self, channel_ref: &str, ticket: &Ticket) -> Result<(), BotError> {
        let owner = self.owner(ticket).await;
        let body = CreateMessage::embed(embeds::ticket_intro(ticket, owner.as_ref(), Utc::now()))
            .components(embeds::ticket_controls(ticket.id))
            .no_mentions();
        self.client.create_message(channel_ref, body).await?;
        Ok(())
    }

    async fn send_file(
        &self,
        channel_ref: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<(), BotError> {
        self.client.send_file(channel_ref, filename, bytes, None).await?;
        Ok(())
    }

    async fn list_members(&self) -> Result<Vec<KnownMember>, BotError> {
        let mut known = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page = self
                .client
                .list_guild_members(&self.guild_id, MEMBER_PAGE_LIMIT, after.as_deref())
                .await?;
            let full_page = page.len() >= MEMBER_PAGE_LIMIT as usize;
            for member in page {
                let Some(user) = member.user else { continue };
                after = Some(user.id.clone());
                let mut names = vec![user.username.clone()];
                names.extend(user.global_name.clone());
                names.extend(member.nick.clone());
                known.push(KnownMember { id: user.id, names });
            }
            if !full_page {
                break;
            }
        }
        Ok(known)
    }
}
