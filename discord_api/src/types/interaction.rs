use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    api::interactions::InteractionsApi,
    client::DiscordClient,
    error::DiscordError,
    types::{
        channel::Permissions,
        component::Component,
        message::{AllowedMentions, CreateMessage, Embed, Message, EPHEMERAL},
        user::{Member, User},
    },
};

pub const APPLICATION_COMMAND: u8 = 2;
pub const MESSAGE_COMPONENT: u8 = 3;
pub const MODAL_SUBMIT: u8 = 5;

pub const CALLBACK_CHANNEL_MESSAGE: u8 = 4;
pub const CALLBACK_DEFERRED_CHANNEL_MESSAGE: u8 = 5;
pub const CALLBACK_DEFERRED_UPDATE_MESSAGE: u8 = 6;
pub const CALLBACK_UPDATE_MESSAGE: u8 = 7;
pub const CALLBACK_MODAL: u8 = 9;

pub const OPTION_STRING: u8 = 3;
pub const OPTION_USER: u8 = 6;

/// An interaction as delivered by `INTERACTION_CREATE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub application_id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<InteractionData>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub user: Option<User>,
    pub token: String,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(skip)]
    pub client: Option<DiscordClient>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionData {
    pub id: Option<String>,
    pub name: Option<String>,
    pub custom_id: Option<String>,
    pub component_type: Option<u8>,
    pub values: Vec<String>,
    pub options: Vec<CommandOptionValue>,
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOptionValue {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub options: Vec<CommandOptionValue>,
}

/// Callback sent in reply to an interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<InteractionCallbackData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionCallbackData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Embed>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mentions: Option<AllowedMentions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl From<CreateMessage> for InteractionCallbackData {
    fn from(msg: CreateMessage) -> Self {
        Self {
            content: msg.content,
            embeds: msg.embeds,
            components: msg.components,
            allowed_mentions: msg.allowed_mentions,
            flags: msg.flags,
            ..Default::default()
        }
    }
}

impl InteractionResponse {
    pub fn message(msg: CreateMessage) -> Self {
        Self {
            kind: CALLBACK_CHANNEL_MESSAGE,
            data: Some(msg.into()),
        }
    }

    pub fn update(msg: CreateMessage) -> Self {
        Self {
            kind: CALLBACK_UPDATE_MESSAGE,
            data: Some(msg.into()),
        }
    }

    pub fn deferred(ephemeral: bool) -> Self {
        Self {
            kind: CALLBACK_DEFERRED_CHANNEL_MESSAGE,
            data: ephemeral.then(|| InteractionCallbackData {
                flags: Some(EPHEMERAL),
                ..Default::default()
            }),
        }
    }

    pub fn deferred_update() -> Self {
        Self {
            kind: CALLBACK_DEFERRED_UPDATE_MESSAGE,
            data: None,
        }
    }

    pub fn modal(custom_id: impl Into<String>, title: impl Into<String>, rows: Vec<Component>) -> Self {
        Self {
            kind: CALLBACK_MODAL,
            data: Some(InteractionCallbackData {
                custom_id: Some(custom_id.into()),
                title: Some(title.into()),
                components: Some(rows),
                ..Default::default()
            }),
        }
    }
}

/// Guild slash command registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationCommand {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ApplicationCommandOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_member_permissions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationCommandOption {
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl ApplicationCommand {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
            default_member_permissions: None,
        }
    }

    pub fn option(mut self, kind: u8, name: &str, description: &str, required: bool) -> Self {
        self.options.push(ApplicationCommandOption {
            kind,
            name: name.to_string(),
            description: description.to_string(),
            required,
        });
        self
    }

    /// Restrict the command to members holding `perms`.
    pub fn requires(mut self, perms: Permissions) -> Self {
        self.default_member_permissions = Some(perms.0.to_string());
        self
    }
}

impl Interaction {
    /// The user who triggered the interaction, in guilds or DMs.
    pub fn invoker(&self) -> Option<&User> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
    }

    pub fn invoker_id(&self) -> Option<&str> {
        self.invoker().map(|u| u.id.as_str())
    }

    pub fn invoker_permissions(&self) -> Permissions {
        self.member
            .as_ref()
            .and_then(|m| m.permissions.as_deref())
            .and_then(|p| p.parse::<u64>().ok())
            .map(Permissions)
            .unwrap_or(Permissions::NONE)
    }

    pub fn is_admin(&self) -> bool {
        self.invoker_permissions().contains(Permissions::ADMINISTRATOR)
    }

    pub fn command_name(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.name.as_deref())
    }

    pub fn custom_id(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.custom_id.as_deref())
    }

    /// Values picked in a select menu.
    pub fn selected_values(&self) -> &[String] {
        self.data.as_ref().map(|d| d.values.as_slice()).unwrap_or(&[])
    }

    /// Top-level slash command option rendered as a string. User options
    /// resolve to the user id.
    pub fn option_str(&self, name: &str) -> Option<String> {
        let opt = self.data.as_ref()?.options.iter().find(|o| o.name == name)?;
        match opt.value.as_ref()? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Text input value from a modal submission.
    pub fn modal_value(&self, custom_id: &str) -> Option<&str> {
        let data = self.data.as_ref()?;
        Component::find(&data.components, custom_id)?.value.as_deref()
    }

    fn attached_client(&self) -> Result<&DiscordClient, DiscordError> {
        self.client
            .as_ref()
            .ok_or_else(|| DiscordError::Other("Client not attached".to_string()))
    }

    pub async fn respond(&self, response: InteractionResponse) -> Result<(), DiscordError> {
        self.attached_client()?
            .create_interaction_response(&self.id, &self.token, &response)
            .await
    }

    /// Plain message reply, never pinging anyone.
    pub async fn reply(&self, content: &str, ephemeral: bool) -> Result<(), DiscordError> {
        let mut msg = CreateMessage::text(content).no_mentions();
        if ephemeral {
            msg = msg.ephemeral();
        }
        self.respond(InteractionResponse::message(msg)).await
    }

    pub async fn defer(&self, ephemeral: bool) -> Result<(), DiscordError> {
        self.respond(InteractionResponse::deferred(ephemeral)).await
    }

    pub async fn followup(&self, msg: CreateMessage) -> Result<Message, DiscordError> {
        let client = self.attached_client()?;
        client
            .create_followup_message(&self.application_id, &self.token, &msg)
            .await
    }

    pub async fn edit_original(&self, msg: CreateMessage) -> Result<Message, DiscordError> {
        let client = self.attached_client()?;
        client
            .edit_original_response(&self.application_id, &self.token, &msg)
            .await
    }
}
