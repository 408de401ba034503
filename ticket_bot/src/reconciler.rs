//! Keeps one live channel per Open ticket and none per Closed ticket.
//!
//! Every pass re-checks external channel existence before acting, so a
//! tick can be interrupted at any point and the next one finishes the job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::{
    error::BotError,
    model::{Ticket, TicketFilter, TicketStatus},
    provider::{ChannelAcl, ChannelProvider},
    relay::Relay,
    store::TicketStore,
    transcript::TranscriptRenderer,
};

pub const CLOSING_NOTICE: &str =
    "🔒 This ticket has been closed. The channel will be deleted shortly.";

/// Wakes the reconciler ahead of its next scheduled tick.
#[derive(Clone, Default)]
pub struct Nudge(Arc<Notify>);

impl Nudge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nudge(&self) {
        self.0.notify_one();
    }

    pub async fn notified(&self) {
        self.0.notified().await;
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub grace_delay: Duration,
    /// How long after closing a ticket is still checked for a leftover channel.
    pub orphan_sweep_window: chrono::Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            grace_delay: Duration::from_secs(10),
            orphan_sweep_window: chrono::Duration::minutes(10),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub provisioned: usize,
    pub closed: usize,
    pub corrected: usize,
    /// Setups finished on a channel that already existed.
    pub resumed: usize,
    pub swept: usize,
    pub failed: usize,
}

pub struct Reconciler {
    store: Arc<dyn TicketStore>,
    provider: Arc<dyn ChannelProvider>,
    relay: Relay,
    transcripts: Arc<TranscriptRenderer>,
    settings: ReconcilerSettings,
    nudge: Nudge,
    shutdown: watch::Receiver<bool>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn TicketStore>,
        provider: Arc<dyn ChannelProvider>,
        relay: Relay,
        transcripts: Arc<TranscriptRenderer>,
        settings: ReconcilerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            provider,
            relay,
            transcripts,
            settings,
            nudge: Nudge::new(),
            shutdown,
        }
    }

    /// Handle for requesting an immediate tick.
    pub fn nudger(&self) -> Nudge {
        self.nudge.clone()
    }

    pub fn nudge(&self) {
        self.nudge.nudge();
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// One reconciliation pass over all tickets in ascending id order.
    ///
    /// Only a failure to list tickets fails the tick; per-ticket errors are
    /// logged and counted, and the ticket is retried next time.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, BotError> {
        let tickets = self.store.list_tickets(TicketFilter::All).await?;
        let mut report = TickReport::default();

        for ticket in &tickets {
            if self.shutting_down() {
                debug!("shutdown requested, ending tick early");
                break;
            }

            let result = match ticket.status {
                TicketStatus::Open => self.reconcile_open(ticket, now, &mut report).await,
                TicketStatus::Closed if ticket.channel_ref.is_some() => {
                    self.close_channel(ticket, now, &mut report).await
                }
                TicketStatus::Closed
                    if ticket.updated_at >= now - self.settings.orphan_sweep_window =>
                {
                    self.sweep_orphan(ticket, &mut report).await
                }
                TicketStatus::Closed => Ok(()),
            };

            if let Err(e) = result {
                report.failed += 1;
                match &e {
                    BotError::Persistence(_) => {
                        error!(ticket_id = ticket.id, error = %e, "store failure, aborting ticket step")
                    }
                    _ => warn!(ticket_id = ticket.id, error = %e, "reconcile step failed, retrying next tick"),
                }
            }
        }

        if report != TickReport::default() {
            info!(
                provisioned = report.provisioned,
                closed = report.closed,
                corrected = report.corrected,
                resumed = report.resumed,
                swept = report.swept,
                failed = report.failed,
                "reconcile tick finished"
            );
        }
        Ok(report)
    }

    async fn reconcile_open(
        &self,
        ticket: &Ticket,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), BotError> {
        let name = ticket.channel_name();
        let channel = match self.provider.channel_exists(&name).await? {
            Some(live) if ticket.channel_ref.as_deref() == Some(live.as_str()) => {
                if ticket.provisioned {
                    return Ok(());
                }
                info!(ticket_id = ticket.id, channel_id = %live, "resuming channel setup");
                report.resumed += 1;
                live
            }
            Some(live) => {
                // A channel found by name may never have been set up.
                info!(ticket_id = ticket.id, channel_id = %live, "correcting stale channel ref");
                self.store.set_channel_ref(ticket.id, Some(&live), now).await?;
                report.corrected += 1;
                live
            }
            None => {
                let acl = ChannelAcl {
                    topic: format!("Ticket #{}", ticket.id),
                    allowed_users: ticket.owner_ref.iter().cloned().collect(),
                };
                let channel = self.provider.create_channel(&name, &acl).await?;
                self.store.set_channel_ref(ticket.id, Some(&channel), now).await?;
                report.provisioned += 1;
                info!(ticket_id = ticket.id, channel_id = %channel, "provisioned ticket channel");
                channel
            }
        };

        // Any failure leaves `provisioned` unset and the whole setup runs
        // again next tick.
        self.provider.send_ticket_intro(&channel, ticket).await?;
        self.attach_transcript(ticket, &channel).await?;
        self.relay.backfill(ticket, &channel).await?;
        self.store.mark_provisioned(ticket.id, &channel).await?;

        // The ticket may have been closed while we were provisioning.
        if let Some(fresh) = self.store.get_ticket(ticket.id).await? {
            if !fresh.is_open() && fresh.channel_ref.is_some() {
                debug!(ticket_id = ticket.id, "closed during provisioning");
                self.close_channel(&fresh, now, report).await?;
            }
        }
        Ok(())
    }

    async fn attach_transcript(&self, ticket: &Ticket, channel: &str) -> Result<(), BotError> {
        let history = self.store.list_messages_for_ticket(ticket.id).await?;
        if history.is_empty() {
            return Ok(());
        }
        let html = self.transcripts.render(ticket.id, &history)?;
        self.provider
            .send_file(channel, &TranscriptRenderer::file_name(ticket.id), html.into_bytes())
            .await
    }

    async fn close_channel(
        &self,
        ticket: &Ticket,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), BotError> {
        let Some(channel) = ticket.channel_ref.as_deref() else {
            return Ok(());
        };

        match self.provider.send_text(channel, CLOSING_NOTICE).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(ticket_id = ticket.id, channel_id = channel, "channel already gone, clearing ref");
                self.store.set_channel_ref(ticket.id, None, now).await?;
                report.closed += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        if !self.wait_grace().await {
            // The ref stays set, so the next start finishes the teardown.
            info!(ticket_id = ticket.id, "shutdown during grace delay, deferring teardown");
            return Ok(());
        }

        // A reopen during the grace delay keeps the channel.
        match self.store.get_ticket(ticket.id).await? {
            Some(fresh) if fresh.is_open() => {
                info!(ticket_id = ticket.id, "reopened during grace delay, keeping channel");
                return Ok(());
            }
            _ => {}
        }

        match self.provider.delete_channel(channel).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(ticket_id = ticket.id, channel_id = channel, "channel vanished before delete");
            }
            Err(e) => return Err(e),
        }
        self.store.set_channel_ref(ticket.id, None, now).await?;
        report.closed += 1;
        info!(ticket_id = ticket.id, channel_id = channel, "ticket channel torn down");
        Ok(())
    }

    /// Remove a channel left by a provisioning that was interrupted before
    /// its ref was stored.
    async fn sweep_orphan(&self, ticket: &Ticket, report: &mut TickReport) -> Result<(), BotError> {
        let Some(orphan) = self.provider.channel_exists(&ticket.channel_name()).await? else {
            return Ok(());
        };
        warn!(ticket_id = ticket.id, channel_id = %orphan, "deleting orphaned channel of closed ticket");
        match self.provider.delete_channel(&orphan).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        report.swept += 1;
        Ok(())
    }

    /// Sleep for the grace delay. Returns false when shutdown interrupts it.
    async fn wait_grace(&self) -> bool {
        let mut shutdown = self.shutdown.clone();
        let deadline = Instant::now() + self.settings.grace_delay;
        loop {
            if *shutdown.borrow_and_update() {
                return false;
            }
            tokio::select! {
                _ = sleep_until(deadline) => return true,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        sleep_until(deadline).await;
                        return true;
                    }
                }
            }
        }
    }
}
