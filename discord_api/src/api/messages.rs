use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use ulid::Ulid;

use crate::{
    client::{expect_success, parse_json_if_ok, DiscordClient},
    error::DiscordError,
    types::message::{CreateMessage, Message},
    util::{build_url, encode_segment},
};

/// Query for `GET /channels/{id}/messages`. At most one of
/// `before`/`after`/`around` is honoured by the API.
#[derive(Debug, Default, Serialize)]
pub struct FetchMessagesOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub around: Option<String>,
}

/// Trait that holds the methods for message endpoints.
#[async_trait]
pub trait MessagesApi {
    /// Fetch up to 100 messages, newest first.
    async fn fetch_messages(
        &self,
        channel_id: &str,
        opts: Option<FetchMessagesOptions>,
    ) -> Result<Vec<Message>, DiscordError>;

    async fn fetch_message(&self, channel_id: &str, message_id: &str)
        -> Result<Message, DiscordError>;

    /// Send a message. A nonce is generated when the body has none.
    async fn create_message(
        &self,
        channel_id: &str,
        body: CreateMessage,
    ) -> Result<Message, DiscordError>;

    /// Plain text message with mentions disabled.
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<Message, DiscordError>;

    /// Upload a single file, optionally with message content alongside.
    async fn send_file(
        &self,
        channel_id: &str,
        filename: &str,
        bytes: Vec<u8>,
        body: Option<CreateMessage>,
    ) -> Result<Message, DiscordError>;

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        body: &CreateMessage,
    ) -> Result<Message, DiscordError>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), DiscordError>;

    /// `emoji` is a unicode glyph or `name:id`.
    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), DiscordError>;

    async fn delete_user_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> Result<(), DiscordError>;
}

fn messages_url(client: &DiscordClient, channel_id: &str) -> String {
    build_url(&client.base_url, &["channels", channel_id, "messages"])
}

/// Multipart body carrying `payload_json` plus one file as `files[0]`.
pub(crate) fn file_form(
    filename: &str,
    bytes: Vec<u8>,
    body: Option<CreateMessage>,
) -> Result<Form, DiscordError> {
    let mut payload = serde_json::to_value(body.unwrap_or_default())?;
    if let Some(obj) = payload.as_object_mut() {
        obj.insert(
            "attachments".to_string(),
            serde_json::json!([{ "id": 0, "filename": filename }]),
        );
    }
    let part = Part::bytes(bytes).file_name(filename.to_string());
    Ok(Form::new()
        .text("payload_json", serde_json::to_string(&payload)?)
        .part("files[0]", part))
}

#[async_trait]
impl MessagesApi for DiscordClient {
    async fn fetch_messages(
        &self,
        channel_id: &str,
        opts: Option<FetchMessagesOptions>,
    ) -> Result<Vec<Message>, DiscordError> {
        let mut url = messages_url(self, channel_id);

        let query = match opts {
            Some(o) => serde_urlencoded::to_string(o)
                .map_err(|e| DiscordError::Other(format!("Bad message query: {e}")))?,
            None => String::new(),
        };
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        let resp = self.authed_get(&url).await?;
        let mut messages: Vec<Message> = parse_json_if_ok(resp).await?;
        for m in &mut messages {
            m.client = Some(self.clone());
        }
        Ok(messages)
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Message, DiscordError> {
        let url = build_url(&self.base_url, &["channels", channel_id, "messages", message_id]);
        let resp = self.authed_get(&url).await?;
        let mut message: Message = parse_json_if_ok(resp).await?;
        message.client = Some(self.clone());
        Ok(message)
    }

    async fn create_message(
        &self,
        channel_id: &str,
        mut body: CreateMessage,
    ) -> Result<Message, DiscordError> {
        let url = messages_url(self, channel_id);

        // Nonces are capped at 25 characters, so use the ULID's random part.
        if body.nonce.is_none() {
            body.nonce = Some(Ulid::new().random().to_string());
        }

        let resp = self.authed_post(&url, &body, None).await?;
        let mut message: Message = parse_json_if_ok(resp).await?;
        message.client = Some(self.clone());
        Ok(message)
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<Message, DiscordError> {
        self.create_message(channel_id, CreateMessage::text(content).no_mentions())
            .await
    }

    async fn send_file(
        &self,
        channel_id: &str,
        filename: &str,
        bytes: Vec<u8>,
        body: Option<CreateMessage>,
    ) -> Result<Message, DiscordError> {
        let url = messages_url(self, channel_id);
        let form = file_form(filename, bytes, body)?;
        let resp = self.authed_post_multipart(&url, form).await?;
        let mut message: Message = parse_json_if_ok(resp).await?;
        message.client = Some(self.clone());
        Ok(message)
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        body: &CreateMessage,
    ) -> Result<Message, DiscordError> {
        let url = build_url(&self.base_url, &["channels", channel_id, "messages", message_id]);
        let resp = self.authed_patch(&url, body, None).await?;
        let mut message: Message = parse_json_if_ok(resp).await?;
        message.client = Some(self.clone());
        Ok(message)
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), DiscordError> {
        let url = build_url(&self.base_url, &["channels", channel_id, "messages", message_id]);
        let resp = self.authed_delete(&url, None).await?;
        expect_success(resp).await
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), DiscordError> {
        let emoji = encode_segment(emoji);
        let url = build_url(
            &self.base_url,
            &["channels", channel_id, "messages", message_id, "reactions", &emoji, "@me"],
        );
        let resp = self.authed_put_empty(&url).await?;
        expect_success(resp).await
    }

    async fn delete_user_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> Result<(), DiscordError> {
        let emoji = encode_segment(emoji);
        let url = build_url(
            &self.base_url,
            &["channels", channel_id, "messages", message_id, "reactions", &emoji, user_id],
        );
        let resp = self.authed_delete(&url, None).await?;
        expect_success(resp).await
    }
}
