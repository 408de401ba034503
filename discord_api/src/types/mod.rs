pub mod channel;
pub mod component;
pub mod error_types;
pub mod gateway;
pub mod interaction;
pub mod message;
pub mod user;

// Re-export the main types commonly used
pub use channel::{Channel, CreateGuildChannel, OverwriteType, PermissionOverwrite, Permissions};
pub use component::{Component, SelectOption};
pub use error_types::Error as ApiError;
pub use gateway::*;
pub use interaction::{ApplicationCommand, Interaction, InteractionResponse};
pub use message::{AllowedMentions, Attachment, CreateMessage, Embed, Message};
pub use user::{Member, User};
