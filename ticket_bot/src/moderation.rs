//! Automatic timeouts for members who ping the admins.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use discord_api::{CreateMessage, DiscordClient, GuildsApi, Message, MessagesApi};
use tracing::{info, warn};

use crate::{config::BotConfig, embeds, error::BotError};

fn is_admin(config: &BotConfig, message: &Message) -> bool {
    config.is_admin_user(&message.author.id)
        || message
            .member
            .as_ref()
            .is_some_and(|m| m.has_role(&config.admin.role_id))
}

/// Whether the message pings the admin role or a listed admin, sent by
/// someone who is not an admin. Replying to an admin does not count.
pub fn should_timeout(config: &BotConfig, message: &Message) -> bool {
    if message.author.bot || message.webhook_id.is_some() || message.guild_id.is_none() {
        return false;
    }
    if is_admin(config, message) {
        return false;
    }
    if message.mention_roles.iter().any(|r| *r == config.admin.role_id) {
        return true;
    }
    let replied_to = message.replied_to_author().map(|u| u.id.as_str());
    message
        .mentions
        .iter()
        .filter(|u| Some(u.id.as_str()) != replied_to)
        .any(|u| config.is_admin_user(&u.id))
}

/// Delete the offending message, time the author out and log it.
pub async fn enforce(
    client: &DiscordClient,
    config: &BotConfig,
    message: &Message,
    now: DateTime<Utc>,
) -> Result<(), BotError> {
    let hours = config.admin.timeout_hours;
    let author = &message.author;

    if let Err(e) = client.delete_message(&message.channel_id, &message.id).await {
        warn!(message_id = %message.id, error = %e, "failed to delete admin ping");
    }

    let until = (now + Duration::hours(i64::from(hours))).to_rfc3339_opts(SecondsFormat::Secs, true);
    client
        .timeout_member(&config.guild_id, &author.id, Some(&until), Some("Mentioned admin"))
        .await?;
    info!(user = %author.id, hours, channel_id = %message.channel_id, "member timed out");

    let notice = CreateMessage::text(format!(
        "⏳ {} has been timed out for {hours} hours for mentioning an admin.",
        author.mention()
    ))
    .no_mentions();
    if let Err(e) = client.create_message(&message.channel_id, notice).await {
        warn!(channel_id = %message.channel_id, error = %e, "failed to post timeout notice");
    }

    let log = CreateMessage::embed(embeds::timeout_log(author, hours, now)).no_mentions();
    client.create_message(&config.admin.log_channel_id, log).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::tests::sample,
        testing::{client_for, message_body},
    };
    use chrono::TimeZone;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn message(value: serde_json::Value) -> Message {
        let mut base = json!({
            "id": "1",
            "channel_id": "50",
            "guild_id": "100",
            "author": { "id": "42", "username": "player" },
            "content": "hey",
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), value.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(base).expect("message json")
    }

    #[test]
    fn role_ping_from_player_triggers() {
        let config = sample();
        assert!(should_timeout(&config, &message(json!({ "mention_roles": ["600"] }))));
    }

    #[test]
    fn listed_admin_ping_triggers() {
        let config = sample();
        let msg = message(json!({ "mentions": [{ "id": "700", "username": "boss" }] }));
        assert!(should_timeout(&config, &msg));
    }

    #[test]
    fn replying_to_an_admin_is_allowed() {
        let config = sample();
        let msg = message(json!({
            "mentions": [{ "id": "700", "username": "boss" }],
            "referenced_message": {
                "id": "0",
                "channel_id": "50",
                "author": { "id": "700", "username": "boss" }
            }
        }));
        assert!(!should_timeout(&config, &msg));
    }

    #[test]
    fn admins_and_bots_are_exempt() {
        let config = sample();
        let by_role = message(json!({
            "mention_roles": ["600"],
            "member": { "roles": ["600"] }
        }));
        assert!(!should_timeout(&config, &by_role));

        let by_list = message(json!({
            "mention_roles": ["600"],
            "author": { "id": "700", "username": "boss" }
        }));
        assert!(!should_timeout(&config, &by_list));

        let bot = message(json!({
            "mention_roles": ["600"],
            "author": { "id": "9", "username": "helper", "bot": true }
        }));
        assert!(!should_timeout(&config, &bot));
    }

    #[test]
    fn other_mentions_are_ignored() {
        let config = sample();
        let msg = message(json!({
            "mentions": [{ "id": "43", "username": "friend" }],
            "mention_roles": ["601"]
        }));
        assert!(!should_timeout(&config, &msg));
    }

    #[tokio::test]
    async fn enforcement_deletes_times_out_and_reports() {
        let mut server = Server::new_async().await;
        let delete = server
            .mock("DELETE", "/channels/50/messages/1")
            .with_status(204)
            .create_async()
            .await;
        let timeout = server
            .mock("PATCH", "/guilds/100/members/42")
            .match_body(Matcher::PartialJson(json!({
                "communication_disabled_until": "2025-03-02T00:00:00Z"
            })))
            .with_status(204)
            .create_async()
            .await;
        let notice = server
            .mock("POST", "/channels/50/messages")
            .match_body(Matcher::PartialJson(json!({
                "content": "⏳ <@42> has been timed out for 12 hours for mentioning an admin.",
                "allowed_mentions": { "parse": [] }
            })))
            .with_status(200)
            .with_body(message_body("2", "50"))
            .create_async()
            .await;
        let log = server
            .mock("POST", "/channels/800/messages")
            .with_status(200)
            .with_body(message_body("3", "800"))
            .create_async()
            .await;

        let config = sample();
        let msg = message(json!({ "mention_roles": ["600"] }));
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        enforce(&client_for(&server), &config, &msg, now).await.unwrap();

        delete.assert_async().await;
        timeout.assert_async().await;
        notice.assert_async().await;
        log.assert_async().await;
    }

    #[tokio::test]
    async fn failed_timeout_is_reported_after_the_delete() {
        let mut server = Server::new_async().await;
        let delete = server
            .mock("DELETE", "/channels/50/messages/1")
            .with_status(204)
            .create_async()
            .await;
        let _timeout = server
            .mock("PATCH", "/guilds/100/members/42")
            .with_status(403)
            .with_body(r#"{"code": 50013, "message": "Missing Permissions"}"#)
            .create_async()
            .await;
        let notice = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let msg = message(json!({ "mention_roles": ["600"] }));
        assert!(enforce(&client_for(&server), &sample(), &msg, Utc::now()).await.is_err());
        delete.assert_async().await;
        notice.assert_async().await;
    }
}
