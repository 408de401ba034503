mod client;

pub use client::{
    audit_reason, expect_success, parse_json_if_ok, DiscordClient, WsSink, DEFAULT_API_BASE,
    DEFAULT_GATEWAY_URL,
};
pub(crate) use client::normalize_proxy;

pub use crate::{
    api::{
        channels::ChannelsApi, guilds::GuildsApi, interactions::InteractionsApi,
        messages::MessagesApi,
    },
    error::{handle_api_error, DiscordError},
};
