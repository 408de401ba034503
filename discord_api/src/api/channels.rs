use async_trait::async_trait;

use crate::{
    client::{expect_success, parse_json_if_ok, DiscordClient},
    error::DiscordError,
    types::channel::{Channel, CreateGuildChannel, PermissionOverwrite},
    util::build_url,
};

#[async_trait]
pub trait ChannelsApi {
    async fn get_channel(&self, channel_id: &str) -> Result<Channel, DiscordError>;

    async fn list_guild_channels(&self, guild_id: &str) -> Result<Vec<Channel>, DiscordError>;

    async fn create_guild_channel(
        &self,
        guild_id: &str,
        body: &CreateGuildChannel,
    ) -> Result<Channel, DiscordError>;

    async fn delete_channel(&self, channel_id: &str) -> Result<(), DiscordError>;

    /// Create or replace one permission overwrite on a channel.
    async fn edit_channel_permissions(
        &self,
        channel_id: &str,
        overwrite: &PermissionOverwrite,
    ) -> Result<(), DiscordError>;
}

#[async_trait]
impl ChannelsApi for DiscordClient {
    async fn get_channel(&self, channel_id: &str) -> Result<Channel, DiscordError> {
        let url = build_url(&self.base_url, &["channels", channel_id]);
        let resp = self.authed_get(&url).await?;
        parse_json_if_ok(resp).await
    }

    async fn list_guild_channels(&self, guild_id: &str) -> Result<Vec<Channel>, DiscordError> {
        let url = build_url(&self.base_url, &["guilds", guild_id, "channels"]);
        let resp = self.authed_get(&url).await?;
        parse_json_if_ok(resp).await
    }

    async fn create_guild_channel(
        &self,
        guild_id: &str,
        body: &CreateGuildChannel,
    ) -> Result<Channel, DiscordError> {
        let url = build_url(&self.base_url, &["guilds", guild_id, "channels"]);
        let resp = self.authed_post(&url, body, None).await?;
        parse_json_if_ok(resp).await
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), DiscordError> {
        let url = build_url(&self.base_url, &["channels", channel_id]);
        let resp = self.authed_delete(&url, None).await?;
        expect_success(resp).await
    }

    async fn edit_channel_permissions(
        &self,
        channel_id: &str,
        overwrite: &PermissionOverwrite,
    ) -> Result<(), DiscordError> {
        let url = build_url(
            &self.base_url,
            &["channels", channel_id, "permissions", &overwrite.id],
        );
        let resp = self.authed_put(&url, overwrite, None).await?;
        expect_success(resp).await
    }
}
