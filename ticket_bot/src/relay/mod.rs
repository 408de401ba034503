//! Message relay: delivers stored messages into live ticket channels.

pub mod format;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    error::BotError,
    model::{StoredMessage, Ticket},
    provider::ChannelProvider,
    store::TicketStore,
};

use format::{MentionTable, Outgoing};

/// Outcome of one drain round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Relay {
    store: Arc<dyn TicketStore>,
    provider: Arc<dyn ChannelProvider>,
    chunk_size: usize,
}

impl Relay {
    pub fn new(
        store: Arc<dyn TicketStore>,
        provider: Arc<dyn ChannelProvider>,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            provider,
            chunk_size,
        }
    }

    /// Deliver every undelivered message whose ticket has a live,
    /// fully provisioned channel.
    ///
    /// Messages go out in `created_at` order. Once a message of a ticket is
    /// skipped or fails, the rest of that ticket waits for the next round.
    pub async fn drain(&self) -> Result<DrainReport, BotError> {
        let pending = self.store.list_undelivered_messages().await?;
        let mut report = DrainReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let mentions = self.mention_table(&pending).await;
        let mut channels: HashMap<i64, Option<String>> = HashMap::new();
        let mut blocked: HashSet<i64> = HashSet::new();

        for message in &pending {
            if blocked.contains(&message.ticket_id) {
                report.skipped += 1;
                continue;
            }

            let channel = match channels.get(&message.ticket_id) {
                Some(channel) => channel.clone(),
                None => match self.store.get_ticket(message.ticket_id).await {
                    Ok(ticket) => {
                        // Until setup finishes the backfill owns the channel.
                        let channel = ticket
                            .filter(|t| t.is_open() && t.provisioned)
                            .and_then(|t| t.channel_ref);
                        channels.insert(message.ticket_id, channel.clone());
                        channel
                    }
                    Err(e) => {
                        warn!(ticket_id = message.ticket_id, error = %e, "failed to load ticket for relay");
                        blocked.insert(message.ticket_id);
                        report.failed += 1;
                        continue;
                    }
                },
            };

            let Some(channel) = channel else {
                debug!(ticket_id = message.ticket_id, message_id = message.id, "no live channel, holding message");
                blocked.insert(message.ticket_id);
                report.skipped += 1;
                continue;
            };

            let sends = format::render(message, &mentions, self.chunk_size);
            if let Err(e) = self.deliver(&channel, &sends).await {
                warn!(
                    ticket_id = message.ticket_id,
                    message_id = message.id,
                    channel_id = %channel,
                    error = %e,
                    "relay delivery failed"
                );
                blocked.insert(message.ticket_id);
                report.failed += 1;
                continue;
            }

            if let Err(e) = self.store.mark_delivered(message.id).await {
                warn!(message_id = message.id, error = %e, "sent but could not mark delivered");
                blocked.insert(message.ticket_id);
                report.failed += 1;
                continue;
            }
            report.delivered += 1;
        }

        if report.delivered > 0 {
            info!(
                delivered = report.delivered,
                skipped = report.skipped,
                failed = report.failed,
                "relay drain finished"
            );
        }
        Ok(report)
    }

    /// Replay a ticket's whole history into a freshly provisioned channel.
    /// Messages that were still undelivered count as delivered afterwards.
    pub async fn backfill(&self, ticket: &Ticket, channel_ref: &str) -> Result<usize, BotError> {
        let history = self.store.list_messages_for_ticket(ticket.id).await?;
        if history.is_empty() {
            return Ok(0);
        }

        let mentions = self.mention_table(&history).await;
        let sends = format::pack_history(&history, &mentions, self.chunk_size);
        self.deliver(channel_ref, &sends).await?;

        for message in history.iter().filter(|m| !m.delivered) {
            self.store.mark_delivered(message.id).await?;
        }
        debug!(ticket_id = ticket.id, channel_id = channel_ref, messages = history.len(), sends = sends.len(), "backfilled history");
        Ok(history.len())
    }

    async fn deliver(&self, channel_ref: &str, sends: &[Outgoing]) -> Result<(), BotError> {
        for send in sends {
            match send {
                Outgoing::Text(text) if text.trim().is_empty() => {}
                Outgoing::Text(text) => self.provider.send_text(channel_ref, text).await?,
                Outgoing::Attachment(url) => self.provider.send_attachment(channel_ref, url).await?,
            }
        }
        Ok(())
    }

    /// Member names are only fetched when some message could mention one.
    async fn mention_table(&self, messages: &[StoredMessage]) -> MentionTable {
        if !messages.iter().any(|m| format::wants_mentions(&m.content)) {
            return MentionTable::default();
        }
        match self.provider.list_members().await {
            Ok(members) => MentionTable::new(&members),
            Err(e) => {
                warn!(error = %e, "could not list members, sending mentions unresolved");
                MentionTable::default()
            }
        }
    }
}
