//! Copies messages written in ticket channels into the store so the
//! history survives channel deletion and can be replayed on reopen.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use discord_api::{
    types::gateway::{MessageDeleteEvent, MessageUpdateEvent},
    Message, User,
};
use regex::Regex;
use tracing::debug;

use crate::{error::BotError, model::NewMessage, store::TicketStore};

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<@!?(\d+)>").expect("valid user mention pattern"))
}

/// Rewrite `<@id>` mentions to `@username` so stored text reads the same
/// outside Discord. Unknown ids are left untouched.
pub fn strip_mentions(content: &str, mentions: &[User]) -> String {
    mention_pattern()
        .replace_all(content, |caps: &regex::Captures<'_>| {
            match mentions.iter().find(|u| u.id == caps[1]) {
                Some(user) => format!("@{}", user.username),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[derive(Clone)]
pub struct InboundMirror {
    store: Arc<dyn TicketStore>,
}

impl InboundMirror {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Store a message posted in a ticket channel. Returns whether a new row
    /// was written.
    pub async fn on_message(&self, message: &Message, now: DateTime<Utc>) -> Result<bool, BotError> {
        if message.author.bot || message.webhook_id.is_some() {
            return Ok(false);
        }
        let Some(ticket) = self.store.find_ticket_by_channel(&message.channel_id).await? else {
            return Ok(false);
        };

        let created_at = message
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or(now);
        let author_name = message
            .member
            .as_ref()
            .and_then(|m| m.nick.as_deref())
            .unwrap_or_else(|| message.author.display_name())
            .to_string();

        let inserted = self
            .store
            .insert_message(NewMessage {
                ticket_id: ticket.id,
                content: strip_mentions(&message.content, &message.mentions),
                attachments: message.attachments.iter().map(|a| a.url.clone()).collect(),
                author_name,
                author_ref: Some(message.author.id.clone()),
                author_avatar_url: Some(message.author.avatar_url()),
                external_ref: Some(message.id.clone()),
                created_at,
                delivered: true,
            })
            .await?;
        match inserted {
            Some(id) => debug!(ticket_id = ticket.id, message_id = %message.id, row = id, "mirrored message"),
            None => debug!(message_id = %message.id, "message already mirrored"),
        }
        Ok(inserted.is_some())
    }

    pub async fn on_update(&self, update: &MessageUpdateEvent) -> Result<bool, BotError> {
        if update.author.as_ref().is_some_and(|a| a.bot) {
            return Ok(false);
        }
        let Some(content) = update.content.as_deref() else {
            return Ok(false);
        };
        let mentions = update.mentions.as_deref().unwrap_or_default();
        let changed = self
            .store
            .update_message_content(&update.id, &strip_mentions(content, mentions))
            .await?;
        if changed {
            debug!(message_id = %update.id, channel_id = %update.channel_id, "mirrored edit");
        }
        Ok(changed)
    }

    pub async fn on_delete(&self, delete: &MessageDeleteEvent) -> Result<bool, BotError> {
        let removed = self.store.delete_message_by_external_ref(&delete.id).await?;
        if removed {
            debug!(message_id = %delete.id, channel_id = %delete.channel_id, "mirrored delete");
        }
        Ok(removed)
    }
}
