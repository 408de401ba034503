//! Community suggestion voting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use discord_api::{
    types::gateway::ReactionAddEvent, types::message::Reaction, CreateMessage, DiscordClient,
    MessagesApi, User,
};
use tracing::{debug, info, warn};

use crate::{
    config::BotConfig,
    embeds::{self, VOTE_DOWN, VOTE_UP},
    error::BotError,
    model::{NewSuggestion, Suggestion},
    store::TicketStore,
};

/// Final vote count, excluding the bot's seed reactions.
pub fn tally(reactions: &[Reaction]) -> (u32, u32) {
    let count = |glyph: &str| {
        reactions
            .iter()
            .find(|r| r.emoji.id.is_none() && r.emoji.name.as_deref() == Some(glyph))
            .map(|r| r.count.saturating_sub(u32::from(r.me)))
            .unwrap_or(0)
    };
    (count(VOTE_UP), count(VOTE_DOWN))
}

/// Votes that must not stand: anything after the vote closed, even before
/// the expiry task locked it, and the author's own. The bot's seed
/// reactions always stay.
pub fn vote_to_remove(
    suggestion: &Suggestion,
    voter: &str,
    bot_id: Option<&str>,
    now: DateTime<Utc>,
) -> bool {
    if bot_id == Some(voter) {
        return false;
    }
    suggestion.locked || suggestion.closes_at <= now || suggestion.author_ref == voter
}

pub struct SuggestionService {
    store: Arc<dyn TicketStore>,
    client: DiscordClient,
    config: Arc<BotConfig>,
}

impl SuggestionService {
    pub fn new(store: Arc<dyn TicketStore>, client: DiscordClient, config: Arc<BotConfig>) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    /// Only members with a registered profile may make suggestions.
    pub async fn is_registered(&self, user_id: &str) -> Result<bool, BotError> {
        Ok(self.store.find_profile_by_discord_id(user_id).await?.is_some())
    }

    /// Post the suggestion into the game's channel, seed the vote
    /// reactions and persist it. Returns the channel it went to.
    pub async fn submit(
        &self,
        game: &str,
        title: &str,
        description: &str,
        author: &User,
        now: DateTime<Utc>,
    ) -> Result<Suggestion, BotError> {
        let channel = self
            .config
            .game(game)
            .and_then(|g| g.suggestion_channel_id.clone())
            .ok_or_else(|| BotError::NotFound(format!("suggestion channel for game {game}")))?;

        let closes_at = now + self.config.timings.vote_duration();
        let embed = embeds::suggestion(title, description, author, closes_at, now);
        let posted = self
            .client
            .create_message(&channel, CreateMessage::embed(embed).no_mentions())
            .await?;
        for glyph in [VOTE_UP, VOTE_DOWN] {
            if let Err(e) = self.client.add_reaction(&channel, &posted.id, glyph).await {
                warn!(message_id = %posted.id, error = %e, "failed to seed vote reaction");
            }
        }

        let stored = self
            .store
            .insert_suggestion(NewSuggestion {
                game: game.to_string(),
                channel_ref: channel.clone(),
                message_ref: posted.id.clone(),
                author_ref: author.id.clone(),
                title: title.to_string(),
                description: description.to_string(),
                closes_at,
            })
            .await;
        let suggestion = match stored {
            Ok(suggestion) => suggestion,
            Err(e) => {
                // Without a row nothing would ever lock it.
                if let Err(cleanup) = self.client.delete_message(&channel, &posted.id).await {
                    warn!(message_id = %posted.id, error = %cleanup, "failed to remove unsaved suggestion");
                }
                return Err(e.into());
            }
        };
        info!(suggestion_id = suggestion.id, game, author = %author.id, "suggestion submitted");
        Ok(suggestion)
    }

    /// Take back a vote cast after the vote closed or by the author on
    /// their own suggestion. Returns whether a reaction was removed.
    pub async fn on_reaction(&self, event: &ReactionAddEvent, now: DateTime<Utc>) -> Result<bool, BotError> {
        let Some(suggestion) = self.store.find_suggestion_by_message(&event.message_id).await? else {
            return Ok(false);
        };
        let bot_id = self.client.bot_user_id().await;
        if !vote_to_remove(&suggestion, &event.user_id, bot_id.as_deref(), now) {
            return Ok(false);
        }
        debug!(
            suggestion_id = suggestion.id,
            user = %event.user_id,
            locked = suggestion.locked,
            "removing vote"
        );
        self.client
            .delete_user_reaction(
                &event.channel_id,
                &event.message_id,
                &event.emoji.route_form(),
                &event.user_id,
            )
            .await?;
        Ok(true)
    }

    /// Close every suggestion whose vote has ended. Returns how many were
    /// locked by this call.
    pub async fn expire(&self, now: DateTime<Utc>) -> Result<usize, BotError> {
        let mut locked = 0;
        for suggestion in self.store.list_expired_suggestions(now).await? {
            match self.close_vote(&suggestion).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!(suggestion_id = suggestion.id, "suggestion message is gone, locking anyway");
                }
                Err(e) => {
                    warn!(suggestion_id = suggestion.id, error = %e, "failed to close vote");
                    continue;
                }
            }
            if self.store.lock_suggestion(suggestion.id).await? {
                locked += 1;
            }
        }
        if locked > 0 {
            info!(locked, "suggestion votes closed");
        }
        Ok(locked)
    }

    async fn close_vote(&self, suggestion: &Suggestion) -> Result<(), BotError> {
        let message = self
            .client
            .fetch_message(&suggestion.channel_ref, &suggestion.message_ref)
            .await?;
        let (up, down) = tally(&message.reactions);
        let Some(embed) = message.embeds.into_iter().next() else {
            return Err(BotError::NotFound(format!("embed on suggestion {}", suggestion.id)));
        };
        let body = CreateMessage {
            embeds: Some(vec![embeds::suggestion_result(embed, up, down)]),
            ..Default::default()
        };
        self.client
            .edit_message(&suggestion.channel_ref, &suggestion.message_ref, &body)
            .await?;
        info!(suggestion_id = suggestion.id, up, down, "suggestion vote tallied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::tests::sample,
        store::SqliteStore,
        testing::{client_for, message_body},
    };
    use chrono::{Duration, TimeZone};
    use discord_api::types::message::Emoji;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
    }

    fn open_suggestion() -> Suggestion {
        Suggestion {
            id: 1,
            game: "eco".into(),
            channel_ref: "500".into(),
            message_ref: "m1".into(),
            author_ref: "42".into(),
            title: "More pigs".into(),
            description: "Please".into(),
            closes_at: at(12),
            locked: false,
        }
    }

    fn new_suggestion(message_ref: &str) -> NewSuggestion {
        NewSuggestion {
            game: "eco".into(),
            channel_ref: "500".into(),
            message_ref: message_ref.into(),
            author_ref: "42".into(),
            title: "More pigs".into(),
            description: "Please".into(),
            closes_at: at(12),
        }
    }

    fn vote(user_id: &str) -> ReactionAddEvent {
        serde_json::from_value(json!({
            "user_id": user_id,
            "channel_id": "500",
            "message_id": "m1",
            "guild_id": "100",
            "emoji": { "name": VOTE_UP },
        }))
        .unwrap()
    }

    fn author() -> User {
        User {
            id: "42".into(),
            username: "player".into(),
            ..Default::default()
        }
    }

    #[test]
    fn other_members_vote_while_the_vote_is_open() {
        assert!(!vote_to_remove(&open_suggestion(), "77", Some("1"), at(11)));
    }

    #[test]
    fn authors_cannot_vote_on_their_own_suggestion() {
        assert!(vote_to_remove(&open_suggestion(), "42", Some("1"), at(11)));
    }

    #[test]
    fn votes_after_closing_are_removed_even_before_the_lock() {
        let mut suggestion = open_suggestion();
        assert!(vote_to_remove(&suggestion, "77", Some("1"), at(12)));
        suggestion.locked = true;
        assert!(vote_to_remove(&suggestion, "77", Some("1"), at(11)));
    }

    #[test]
    fn seed_reactions_of_the_bot_stay() {
        let mut suggestion = open_suggestion();
        suggestion.locked = true;
        assert!(!vote_to_remove(&suggestion, "1", Some("1"), at(13)));
    }

    #[tokio::test]
    async fn late_vote_is_taken_back_and_regular_vote_kept() {
        let mut server = Server::new_async().await;
        let removal = server
            .mock("DELETE", Matcher::Regex(r"^/channels/500/messages/m1/reactions/[^/]+/77$".into()))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        store.insert_suggestion(new_suggestion("m1")).await.unwrap();
        let service = SuggestionService::new(store.clone(), client_for(&server), Arc::new(sample()));

        assert!(!service.on_reaction(&vote("77"), at(11)).await.unwrap());
        assert!(service.on_reaction(&vote("77"), at(13)).await.unwrap());
        removal.assert_async().await;
    }

    #[tokio::test]
    async fn submit_posts_seeds_and_stores() {
        let mut server = Server::new_async().await;
        let post = server
            .mock("POST", "/channels/500/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(message_body("9001", "500"))
            .create_async()
            .await;
        let seeds = server
            .mock("PUT", Matcher::Regex(r"^/channels/500/messages/9001/reactions/[^/]+/@me$".into()))
            .with_status(204)
            .expect(2)
            .create_async()
            .await;

        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let service = SuggestionService::new(store.clone(), client_for(&server), Arc::new(sample()));
        let suggestion = service
            .submit("eco", "More pigs", "Please", &author(), at(10))
            .await
            .unwrap();

        post.assert_async().await;
        seeds.assert_async().await;
        assert_eq!(suggestion.message_ref, "9001");
        assert_eq!(suggestion.closes_at, at(10) + Duration::hours(48));
        let found = store.find_suggestion_by_message("9001").await.unwrap().unwrap();
        assert_eq!(found.id, suggestion.id);
    }

    #[tokio::test]
    async fn unsaved_suggestion_message_is_deleted() {
        let mut server = Server::new_async().await;
        let _post = server
            .mock("POST", "/channels/500/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(message_body("9001", "500"))
            .create_async()
            .await;
        let _seeds = server
            .mock("PUT", Matcher::Regex(r"^/channels/500/messages/9001/reactions/".into()))
            .with_status(204)
            .create_async()
            .await;
        let cleanup = server
            .mock("DELETE", "/channels/500/messages/9001")
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        // The message ref is already taken, so the insert fails.
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        store.insert_suggestion(new_suggestion("9001")).await.unwrap();
        let service = SuggestionService::new(store, client_for(&server), Arc::new(sample()));

        assert!(service
            .submit("eco", "More pigs", "Please", &author(), at(10))
            .await
            .is_err());
        cleanup.assert_async().await;
    }

    #[tokio::test]
    async fn submit_without_a_channel_is_not_found() {
        let server = Server::new_async().await;
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let service = SuggestionService::new(store, client_for(&server), Arc::new(sample()));
        let err = service
            .submit("rust", "t", "d", &author(), at(10))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    fn reaction(glyph: &str, count: u32, me: bool) -> Reaction {
        Reaction {
            count,
            me,
            emoji: Emoji {
                id: None,
                name: Some(glyph.to_string()),
            },
        }
    }

    #[test]
    fn tally_discounts_the_bot_seed_votes() {
        let reactions = vec![reaction(VOTE_UP, 5, true), reaction(VOTE_DOWN, 2, true)];
        assert_eq!(tally(&reactions), (4, 1));
    }

    #[test]
    fn tally_ignores_other_emoji() {
        let reactions = vec![reaction("🎉", 9, false), reaction(VOTE_DOWN, 3, false)];
        assert_eq!(tally(&reactions), (0, 3));
    }

    #[test]
    fn tally_of_nothing_is_a_tie() {
        assert_eq!(tally(&[]), (0, 0));
    }
}
