use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON error body returned by the REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub message: String,
    /// Per-field validation errors, left untyped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(self.code)
    }
}

/// The JSON error codes this crate reacts to. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownAccount,
    UnknownApplication,
    UnknownChannel,
    UnknownGuild,
    UnknownInteraction,
    UnknownMember,
    UnknownMessage,
    UnknownOverwrite,
    UnknownRole,
    UnknownUser,
    UnknownEmoji,
    MissingAccess,
    MissingPermissions,
    CannotSendEmptyMessage,
    InvalidFormBody,
    Other(u32),
}

impl ErrorKind {
    pub fn from_code(code: u32) -> Self {
        match code {
            10001 => Self::UnknownAccount,
            10002 => Self::UnknownApplication,
            10003 => Self::UnknownChannel,
            10004 => Self::UnknownGuild,
            10062 => Self::UnknownInteraction,
            10007 => Self::UnknownMember,
            10008 => Self::UnknownMessage,
            10009 => Self::UnknownOverwrite,
            10011 => Self::UnknownRole,
            10013 => Self::UnknownUser,
            10014 => Self::UnknownEmoji,
            50001 => Self::MissingAccess,
            50013 => Self::MissingPermissions,
            50006 => Self::CannotSendEmptyMessage,
            50035 => Self::InvalidFormBody,
            other => Self::Other(other),
        }
    }

    /// `Unknown …` codes: the addressed object is gone.
    pub fn is_unknown_resource(self) -> bool {
        matches!(
            self,
            Self::UnknownAccount
                | Self::UnknownApplication
                | Self::UnknownChannel
                | Self::UnknownGuild
                | Self::UnknownInteraction
                | Self::UnknownMember
                | Self::UnknownMessage
                | Self::UnknownOverwrite
                | Self::UnknownRole
                | Self::UnknownUser
                | Self::UnknownEmoji
        )
    }
}
