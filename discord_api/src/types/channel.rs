use std::fmt;

use serde::{Deserialize, Serialize};

/// Channel type of a guild text channel.
pub const GUILD_TEXT: u8 = 0;
/// Channel type of a guild category.
pub const GUILD_CATEGORY: u8 = 4;

/// A guild channel as returned by the REST API. Only the fields a bot
/// commonly inspects are typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

/// Body of `POST /guilds/{guild.id}/channels`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGuildChannel {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OverwriteType {
    Role,
    Member,
}

impl TryFrom<u8> for OverwriteType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Role),
            1 => Ok(Self::Member),
            other => Err(format!("unknown overwrite type {other}")),
        }
    }
}

impl From<OverwriteType> for u8 {
    fn from(value: OverwriteType) -> Self {
        match value {
            OverwriteType::Role => 0,
            OverwriteType::Member => 1,
        }
    }
}

/// A channel permission overwrite. `allow`/`deny` are serialized as decimal
/// strings, like the API does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OverwriteType,
    #[serde(with = "permission_string")]
    pub allow: Permissions,
    #[serde(with = "permission_string")]
    pub deny: Permissions,
}

impl PermissionOverwrite {
    pub fn allow_member(user_id: &str, allow: Permissions) -> Self {
        Self {
            id: user_id.to_string(),
            kind: OverwriteType::Member,
            allow,
            deny: Permissions::NONE,
        }
    }

    pub fn allow_role(role_id: &str, allow: Permissions) -> Self {
        Self {
            id: role_id.to_string(),
            kind: OverwriteType::Role,
            allow,
            deny: Permissions::NONE,
        }
    }

    pub fn deny_role(role_id: &str, deny: Permissions) -> Self {
        Self {
            id: role_id.to_string(),
            kind: OverwriteType::Role,
            allow: Permissions::NONE,
            deny,
        }
    }
}

/// Permission bit set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const NONE: Self = Self(0);
    pub const ADMINISTRATOR: Self = Self(1 << 3);
    pub const MANAGE_CHANNELS: Self = Self(1 << 4);
    pub const ADD_REACTIONS: Self = Self(1 << 6);
    pub const VIEW_CHANNEL: Self = Self(1 << 10);
    pub const SEND_MESSAGES: Self = Self(1 << 11);
    pub const MANAGE_MESSAGES: Self = Self(1 << 13);
    pub const EMBED_LINKS: Self = Self(1 << 14);
    pub const ATTACH_FILES: Self = Self(1 << 15);
    pub const READ_MESSAGE_HISTORY: Self = Self(1 << 16);
    pub const MODERATE_MEMBERS: Self = Self(1 << 40);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

mod permission_string {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    use super::Permissions;

    pub fn serialize<S: Serializer>(value: &Permissions, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.0.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Permissions, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse::<u64>().map(Permissions).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_serializes_like_the_api() {
        let ow = PermissionOverwrite::allow_member(
            "80351110224678912",
            Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES,
        );
        let json = serde_json::to_value(&ow).unwrap();
        assert_eq!(json["type"], 1);
        assert_eq!(json["allow"], "3072");
        assert_eq!(json["deny"], "0");

        let back: PermissionOverwrite = serde_json::from_value(json).unwrap();
        assert_eq!(back, ow);
    }

    #[test]
    fn permissions_contains() {
        let p = Permissions::VIEW_CHANNEL | Permissions::READ_MESSAGE_HISTORY;
        assert!(p.contains(Permissions::VIEW_CHANNEL));
        assert!(!p.contains(Permissions::SEND_MESSAGES));
    }
}
