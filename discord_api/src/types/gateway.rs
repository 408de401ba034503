use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{message::Emoji, user::{Member, User}};

/// Gateway opcodes used by this client.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Every gateway frame, in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    pub fn new(op: u8, d: Value) -> Self {
        Self { op, d, s: None, t: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Identify {
    pub token: String,
    pub intents: u64,
    pub properties: IdentifyProperties,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Identify {
    pub fn new(token: &str, intents: u64) -> Self {
        Self {
            token: token.to_string(),
            intents,
            properties: IdentifyProperties {
                os: std::env::consts::OS.to_string(),
                browser: env!("CARGO_PKG_NAME").to_string(),
                device: env!("CARGO_PKG_NAME").to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadyEvent {
    pub user: User,
    pub session_id: String,
    pub application: PartialApplication,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartialApplication {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnavailableGuild {
    pub id: String,
}

/// `MESSAGE_UPDATE` carries a partial message; only `id` and `channel_id`
/// are guaranteed.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageUpdateEvent {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub mentions: Option<Vec<User>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeleteEvent {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReactionAddEvent {
    pub user_id: String,
    pub channel_id: String,
    pub message_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub member: Option<Member>,
    pub emoji: Emoji,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelDeleteEvent {
    pub id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_frame_parses() {
        let raw = r#"{"op":0,"s":42,"t":"MESSAGE_DELETE","d":{"id":"1","channel_id":"2"}}"#;
        let frame: GatewayPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(frame.op, opcode::DISPATCH);
        assert_eq!(frame.s, Some(42));
        let evt: MessageDeleteEvent = serde_json::from_value(frame.d).unwrap();
        assert_eq!(evt.channel_id, "2");
    }

    #[test]
    fn heartbeat_frame_omits_dispatch_fields() {
        let json = serde_json::to_string(&GatewayPayload::new(opcode::HEARTBEAT, Value::from(7))).unwrap();
        assert_eq!(json, r#"{"op":1,"d":7}"#);
    }
}
