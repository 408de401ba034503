pub mod channels;
pub mod guilds;
pub mod interactions;
pub mod messages;
