//! Ticket lifecycle operations triggered by users.
//!
//! Nothing here touches ticket channels directly: status changes are
//! persisted and the reconciler is nudged to bring Discord in line.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use discord_api::{
    api::messages::FetchMessagesOptions, ChannelsApi, CreateMessage, DiscordClient, GuildsApi,
    MessagesApi, OverwriteType, PermissionOverwrite,
};
use tracing::{info, warn};

use crate::{
    config::BotConfig,
    embeds,
    error::BotError,
    model::{MemberProfile, NewTicket, Ticket, TicketStatus},
    provider::ticket_access,
    reconciler::Nudge,
    store::TicketStore,
    transcript::TranscriptRenderer,
};

/// Outcome of adding a user to a ticket channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn TicketStore>,
    client: DiscordClient,
    config: Arc<BotConfig>,
    nudge: Nudge,
    transcripts: Arc<TranscriptRenderer>,
}

impl TicketService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        client: DiscordClient,
        config: Arc<BotConfig>,
        nudge: Nudge,
        transcripts: Arc<TranscriptRenderer>,
    ) -> Self {
        Self {
            store,
            client,
            config,
            nudge,
            transcripts,
        }
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    /// Persist a new Open ticket and wake the reconciler to provision it.
    pub async fn create_ticket(&self, form: NewTicket, now: DateTime<Utc>) -> Result<Ticket, BotError> {
        let ticket = self.store.create_ticket(form, now).await?;
        info!(ticket_id = ticket.id, owner = ?ticket.owner_ref, "ticket created");
        self.nudge.nudge();
        Ok(ticket)
    }

    /// Mark the ticket Closed. Returns the ticket when this call closed it,
    /// `None` when it was already closed.
    pub async fn close_ticket(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Ticket>, BotError> {
        let changed = self.store.set_status(id, TicketStatus::Closed, now).await?;
        if !changed {
            return Ok(None);
        }
        self.nudge.nudge();
        let ticket = self
            .store
            .get_ticket(id)
            .await?
            .ok_or_else(|| BotError::NotFound(format!("ticket {id}")))?;
        info!(ticket_id = id, "ticket closed");
        Ok(Some(ticket))
    }

    /// Flip the ticket back to Open; the reconciler provisions a fresh
    /// channel and replays its history.
    pub async fn reopen_ticket(&self, id: i64, now: DateTime<Utc>) -> Result<bool, BotError> {
        let changed = self.store.set_status(id, TicketStatus::Open, now).await?;
        if changed {
            info!(ticket_id = id, "ticket reopened");
            self.nudge.nudge();
        }
        Ok(changed)
    }

    /// Move ownership to a registered member. Fails with `NotFound` when the
    /// Discord user has no member profile.
    pub async fn reassign_owner(
        &self,
        id: i64,
        new_owner: &str,
        now: DateTime<Utc>,
    ) -> Result<MemberProfile, BotError> {
        let profile = self
            .store
            .find_profile_by_discord_id(new_owner)
            .await?
            .ok_or_else(|| BotError::NotFound(format!("registered member {new_owner}")))?;
        self.store.reassign_owner(id, &profile, now).await?;
        info!(ticket_id = id, owner = new_owner, profile_id = profile.id, "ticket owner reassigned");
        Ok(profile)
    }

    /// HTML transcript of every stored message of the ticket.
    pub async fn transcript(&self, id: i64) -> Result<(String, Vec<u8>), BotError> {
        if self.store.get_ticket(id).await?.is_none() {
            return Err(BotError::NotFound(format!("ticket {id}")));
        }
        let messages = self.store.list_messages_for_ticket(id).await?;
        let html = self.transcripts.render(id, &messages)?;
        Ok((TranscriptRenderer::file_name(id), html.into_bytes()))
    }

    /// Archive entry in the transcript log channel with Transcript and
    /// Reopen buttons.
    pub async fn post_closure_log(&self, ticket: &Ticket, closed_by: &str, now: DateTime<Utc>) {
        let owner = match ticket.owner_ref.as_deref() {
            Some(owner) => self.client.get_user(owner).await.ok(),
            None => None,
        };
        let body = CreateMessage::embed(embeds::closure_log(ticket, closed_by, owner.as_ref(), now))
            .components(embeds::closure_controls(ticket.id))
            .no_mentions();
        if let Err(e) = self
            .client
            .create_message(&self.config.transcript_log_channel_id, body)
            .await
        {
            warn!(ticket_id = ticket.id, error = %e, "failed to post closure log");
        }
    }

    /// Registered members holding a member overwrite on the ticket channel.
    pub async fn eligible_owners(&self, ticket: &Ticket) -> Result<Vec<MemberProfile>, BotError> {
        let Some(channel) = ticket.channel_ref.as_deref() else {
            return Ok(Vec::new());
        };
        let channel = self.client.get_channel(channel).await?;
        let ids: Vec<String> = channel
            .permission_overwrites
            .into_iter()
            .filter(|o| o.kind == OverwriteType::Member)
            .map(|o| o.id)
            .collect();
        Ok(self.store.list_profiles_by_discord_ids(&ids).await?)
    }

    /// After a reassignment: let the new owner into the channel and show
    /// them on the intro embed. Returns false when the intro embed could
    /// not be found.
    pub async fn refresh_owner_in_channel(&self, ticket: &Ticket, owner: &str) -> Result<bool, BotError> {
        let Some(channel) = ticket.channel_ref.as_deref() else {
            return Ok(true);
        };
        self.client
            .edit_channel_permissions(channel, &PermissionOverwrite::allow_member(owner, ticket_access()))
            .await?;

        let user = self.client.get_user(owner).await?;
        let Some((message_id, intro)) = self.find_intro(channel).await? else {
            warn!(ticket_id = ticket.id, channel_id = channel, "intro embed not found");
            return Ok(false);
        };
        let body = CreateMessage {
            embeds: Some(vec![embeds::with_owner(intro, &user)]),
            ..Default::default()
        };
        self.client.edit_message(channel, &message_id, &body).await?;
        Ok(true)
    }

    async fn find_intro(&self, channel: &str) -> Result<Option<(String, discord_api::Embed)>, BotError> {
        let bot_id = self.client.bot_user_id().await;
        let recent = self
            .client
            .fetch_messages(
                channel,
                Some(FetchMessagesOptions {
                    limit: Some(20),
                    ..Default::default()
                }),
            )
            .await?;
        // Oldest first, so the intro wins over later bot embeds.
        Ok(recent
            .into_iter()
            .rev()
            .filter(|m| m.author.bot && bot_id.as_deref().map_or(true, |id| m.author.id == id))
            .find_map(|m| {
                let embed = m.embeds.into_iter().next()?;
                embed.author.as_ref()?;
                Some((m.id, embed))
            }))
    }

    /// Grant a user access to a ticket channel.
    pub async fn add_to_ticket(&self, channel: &str, user: &str) -> Result<AddOutcome, BotError> {
        let current = self.client.get_channel(channel).await?;
        let present = current
            .permission_overwrites
            .iter()
            .any(|o| o.kind == OverwriteType::Member && o.id == user);
        if present {
            return Ok(AddOutcome::AlreadyPresent);
        }
        self.client
            .edit_channel_permissions(channel, &PermissionOverwrite::allow_member(user, ticket_access()))
            .await?;
        info!(channel_id = channel, user, "user added to ticket");
        Ok(AddOutcome::Added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::tests::sample, model::NewMessage, store::SqliteStore};
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap()
    }

    fn service() -> (TicketService, Arc<SqliteStore>, Nudge) {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let nudge = Nudge::new();
        let service = TicketService::new(
            store.clone(),
            DiscordClient::new(None, None).unwrap(),
            Arc::new(sample()),
            nudge.clone(),
            Arc::new(TranscriptRenderer::new()),
        );
        (service, store, nudge)
    }

    fn form(owner: &str) -> NewTicket {
        NewTicket {
            subject: "Stuck".into(),
            owner_ref: Some(owner.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn creating_a_ticket_wakes_the_reconciler() {
        let (service, _, nudge) = service();
        let ticket = service.create_ticket(form("77"), at(0)).await.unwrap();
        assert!(ticket.is_open());
        // The stored permit makes this return at once.
        nudge.notified().await;
    }

    #[tokio::test]
    async fn close_and_reopen_are_idempotent() {
        let (service, _, _) = service();
        let ticket = service.create_ticket(form("77"), at(0)).await.unwrap();

        let closed = service.close_ticket(ticket.id, at(1)).await.unwrap();
        assert_eq!(closed.map(|t| t.status), Some(TicketStatus::Closed));
        assert!(service.close_ticket(ticket.id, at(2)).await.unwrap().is_none());

        assert!(service.reopen_ticket(ticket.id, at(3)).await.unwrap());
        assert!(!service.reopen_ticket(ticket.id, at(4)).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_ticket_is_not_found() {
        let (service, _, _) = service();
        assert!(service.close_ticket(404, at(0)).await.unwrap_err().is_not_found());
        assert!(service.transcript(404).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn reassignment_requires_a_registered_member() {
        let (service, store, _) = service();
        let first = store.insert_member_profile("Mira", Some("77")).await.unwrap();
        let second = store.insert_member_profile("Sam", Some("88")).await.unwrap();
        let ticket = service.create_ticket(form("77"), at(0)).await.unwrap();

        let err = service.reassign_owner(ticket.id, "99", at(1)).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.owner_associations(ticket.id).await.unwrap(), vec![first.id]);

        let profile = service.reassign_owner(ticket.id, "88", at(2)).await.unwrap();
        assert_eq!(profile.id, second.id);
        let ticket = store.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(ticket.owner_ref.as_deref(), Some("88"));
        assert_eq!(store.owner_associations(ticket.id).await.unwrap(), vec![second.id]);
    }

    #[tokio::test]
    async fn transcript_is_an_html_file_of_the_history() {
        let (service, store, _) = service();
        let ticket = service.create_ticket(form("77"), at(0)).await.unwrap();
        store
            .insert_message(NewMessage::pending(ticket.id, "Mira", "<b>help</b>", at(1)))
            .await
            .unwrap();

        let (name, bytes) = service.transcript(ticket.id).await.unwrap();
        assert_eq!(name, format!("transcript-ticket-{}.html", ticket.id));
        let html = String::from_utf8(bytes).unwrap();
        assert!(html.contains("&lt;b&gt;help&lt;/b&gt;"));
        assert!(!html.contains("<b>help</b>"));
    }
}
