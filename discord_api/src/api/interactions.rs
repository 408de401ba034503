use async_trait::async_trait;

use crate::{
    api::messages::file_form,
    client::{expect_success, parse_json_if_ok, DiscordClient},
    error::DiscordError,
    types::{
        interaction::{ApplicationCommand, InteractionResponse},
        message::{CreateMessage, Message},
    },
    util::build_url,
};

/// Interaction callbacks, follow-ups and command registration.
#[async_trait]
pub trait InteractionsApi {
    /// Initial response; must arrive within three seconds of the interaction.
    async fn create_interaction_response(
        &self,
        interaction_id: &str,
        token: &str,
        response: &InteractionResponse,
    ) -> Result<(), DiscordError>;

    async fn create_followup_message(
        &self,
        application_id: &str,
        token: &str,
        body: &CreateMessage,
    ) -> Result<Message, DiscordError>;

    async fn create_followup_file(
        &self,
        application_id: &str,
        token: &str,
        filename: &str,
        bytes: Vec<u8>,
        body: Option<CreateMessage>,
    ) -> Result<Message, DiscordError>;

    async fn edit_original_response(
        &self,
        application_id: &str,
        token: &str,
        body: &CreateMessage,
    ) -> Result<Message, DiscordError>;

    /// Replace the guild's command set with `commands`.
    async fn bulk_overwrite_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, DiscordError>;
}

#[async_trait]
impl InteractionsApi for DiscordClient {
    async fn create_interaction_response(
        &self,
        interaction_id: &str,
        token: &str,
        response: &InteractionResponse,
    ) -> Result<(), DiscordError> {
        let url = build_url(
            &self.base_url,
            &["interactions", interaction_id, token, "callback"],
        );
        let resp = self.authed_post(&url, response, None).await?;
        expect_success(resp).await
    }

    async fn create_followup_message(
        &self,
        application_id: &str,
        token: &str,
        body: &CreateMessage,
    ) -> Result<Message, DiscordError> {
        let url = build_url(&self.base_url, &["webhooks", application_id, token]);
        let resp = self.authed_post(&url, body, None).await?;
        let mut message: Message = parse_json_if_ok(resp).await?;
        message.client = Some(self.clone());
        Ok(message)
    }

    async fn create_followup_file(
        &self,
        application_id: &str,
        token: &str,
        filename: &str,
        bytes: Vec<u8>,
        body: Option<CreateMessage>,
    ) -> Result<Message, DiscordError> {
        let url = build_url(&self.base_url, &["webhooks", application_id, token]);
        let form = file_form(filename, bytes, body)?;
        let resp = self.authed_post_multipart(&url, form).await?;
        let mut message: Message = parse_json_if_ok(resp).await?;
        message.client = Some(self.clone());
        Ok(message)
    }

    async fn edit_original_response(
        &self,
        application_id: &str,
        token: &str,
        body: &CreateMessage,
    ) -> Result<Message, DiscordError> {
        let url = build_url(
            &self.base_url,
            &["webhooks", application_id, token, "messages", "@original"],
        );
        let resp = self.authed_patch(&url, body, None).await?;
        let mut message: Message = parse_json_if_ok(resp).await?;
        message.client = Some(self.clone());
        Ok(message)
    }

    async fn bulk_overwrite_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, DiscordError> {
        let url = build_url(
            &self.base_url,
            &["applications", application_id, "guilds", guild_id, "commands"],
        );
        let resp = self.authed_put(&url, commands, None).await?;
        parse_json_if_ok(resp).await
    }
}
