//! Fixtures for unit tests that talk to a mocked Discord API.

use discord_api::DiscordClient;
use mockito::ServerGuard;
use serde_json::json;

/// Client whose REST calls go to `server`.
pub(crate) fn client_for(server: &ServerGuard) -> DiscordClient {
    let mut client = DiscordClient::new(Some(server.url()), None).unwrap();
    // Environment proxies must not intercept requests to the mock.
    client.http = reqwest::Client::builder().no_proxy().build().unwrap();
    client
}

/// Minimal message object as Discord returns it after a send.
pub(crate) fn message_body(id: &str, channel_id: &str) -> String {
    json!({
        "id": id,
        "channel_id": channel_id,
        "author": { "id": "1", "username": "helper", "bot": true },
    })
    .to_string()
}
