use serde::{Deserialize, Serialize};

use crate::{
    api::messages::MessagesApi,
    client::DiscordClient,
    error::DiscordError,
    types::{component::Component, user::{Member, User}},
};

/// Message flag that hides the message from everyone but the invoker.
pub const EPHEMERAL: u64 = 1 << 6;

/// Body for creating (or editing) a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Embed>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mentions: Option<AllowedMentions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<MessageReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
}

impl CreateMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embeds: Some(vec![embed]),
            ..Default::default()
        }
    }

    pub fn components(mut self, components: Vec<Component>) -> Self {
        self.components = Some(components);
        self
    }

    pub fn no_mentions(mut self) -> Self {
        self.allowed_mentions = Some(AllowedMentions::none());
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.flags = Some(self.flags.unwrap_or(0) | EPHEMERAL);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowedMentions {
    pub parse: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    #[serde(default)]
    pub replied_user: bool,
}

impl AllowedMentions {
    /// Suppress every ping, including the replied-to user.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn users(ids: Vec<String>) -> Self {
        Self {
            users: ids,
            ..Default::default()
        }
    }
}

/// A full Message object as returned from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: User,
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub edited_timestamp: Option<String>,
    #[serde(default)]
    pub mentions: Vec<User>,
    #[serde(default)]
    pub mention_roles: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub message_reference: Option<MessageReference>,
    #[serde(default)]
    pub referenced_message: Option<Box<Message>>,
    #[serde(default)]
    pub webhook_id: Option<String>,
    #[serde(default)]
    pub flags: Option<u64>,
    #[serde(skip)]
    pub client: Option<DiscordClient>, // injected after deserialization
}

impl Message {
    fn attached_client(&self) -> Result<&DiscordClient, DiscordError> {
        self.client
            .as_ref()
            .ok_or_else(|| DiscordError::Other("Client not attached".to_string()))
    }

    /// Reply to this message without pinging anyone.
    pub async fn reply(&self, content: &str) -> Result<Message, DiscordError> {
        let client = self.attached_client()?;
        let body = CreateMessage {
            message_reference: Some(MessageReference {
                message_id: Some(self.id.clone()),
                channel_id: Some(self.channel_id.clone()),
                guild_id: self.guild_id.clone(),
            }),
            ..CreateMessage::text(content)
        }
        .no_mentions();
        client.create_message(&self.channel_id, body).await
    }

    pub async fn delete(&self) -> Result<(), DiscordError> {
        self.attached_client()?
            .delete_message(&self.channel_id, &self.id)
            .await
    }

    /// Author of the message this one replies to, if any.
    pub fn replied_to_author(&self) -> Option<&User> {
        self.referenced_message.as_deref().map(|m| &m.author)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub count: u32,
    #[serde(default)]
    pub me: bool,
    pub emoji: Emoji,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Emoji {
    /// Form used in reaction routes: the unicode glyph, or `name:id` for
    /// custom emoji.
    pub fn route_form(&self) -> String {
        match (&self.name, &self.id) {
            (Some(name), Some(id)) => format!("{name}:{id}"),
            (Some(name), None) => name.clone(),
            (None, Some(id)) => id.clone(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn timestamp(mut self, iso8601: impl Into<String>) -> Self {
        self.timestamp = Some(iso8601.into());
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter {
            text: text.into(),
            icon_url: None,
        });
        self
    }

    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(EmbedMedia { url: url.into() });
        self
    }

    pub fn author(mut self, name: impl Into<String>, icon_url: Option<String>) -> Self {
        self.author = Some(EmbedAuthor {
            name: name.into(),
            icon_url,
        });
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedMedia {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_parses_gateway_payload() {
        let raw = serde_json::json!({
            "id": "1001",
            "channel_id": "555",
            "guild_id": "1",
            "author": {"id": "77", "username": "mira", "avatar": null},
            "content": "hello <@88>",
            "mentions": [{"id": "88", "username": "jon"}],
            "attachments": [{"id": "9", "filename": "a.png", "url": "https://cdn/a.png", "size": 10}],
            "referenced_message": {
                "id": "999", "channel_id": "555",
                "author": {"id": "88", "username": "jon"}, "content": "hi"
            }
        });
        let msg: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.mentions[0].username, "jon");
        assert_eq!(msg.attachments[0].filename, "a.png");
        assert_eq!(msg.replied_to_author().map(|u| u.id.as_str()), Some("88"));
        assert!(msg.client.is_none());
    }

    #[test]
    fn no_mentions_serializes_empty_parse_list() {
        let json = serde_json::to_value(CreateMessage::text("x").no_mentions()).unwrap();
        assert_eq!(json["allowed_mentions"]["parse"], serde_json::json!([]));
        assert_eq!(json["allowed_mentions"]["replied_user"], false);
    }

    #[test]
    fn emoji_route_form() {
        let custom = Emoji { id: Some("12".into()), name: Some("pog".into()) };
        assert_eq!(custom.route_form(), "pog:12");
        let unicode = Emoji { id: None, name: Some("👍".into()) };
        assert_eq!(unicode.route_form(), "👍");
    }
}
