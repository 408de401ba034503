#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;

use ticket_bot::{
    error::BotError,
    model::{NewMessage, NewTicket, Ticket},
    provider::{ChannelAcl, ChannelProvider, KnownMember},
    reconciler::{Reconciler, ReconcilerSettings},
    relay::Relay,
    store::{SqliteStore, TicketStore},
    transcript::TranscriptRenderer,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text(String),
    Attachment(String),
    Intro(i64),
    File(String),
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    /// name -> ref
    channels: HashMap<String, String>,
    acls: HashMap<String, ChannelAcl>,
    sent: Vec<(String, Sent)>,
    created: Vec<String>,
    deleted: Vec<String>,
    failing: HashSet<String>,
    members: Vec<KnownMember>,
}

/// In-memory stand-in for the guild: channels by name, everything sent.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Create a channel behind the bot's back.
    pub fn add_channel(&self, name: &str) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let channel_ref = format!("c-{}", state.next_id);
        state.channels.insert(name.to_string(), channel_ref.clone());
        channel_ref
    }

    /// Delete a channel behind the bot's back.
    pub fn remove_channel(&self, channel_ref: &str) {
        self.state().channels.retain(|_, r| r != channel_ref);
    }

    pub fn live(&self, name: &str) -> Option<String> {
        self.state().channels.get(name).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.state().channels.len()
    }

    pub fn created(&self) -> Vec<String> {
        self.state().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    pub fn acl(&self, channel_ref: &str) -> Option<ChannelAcl> {
        self.state().acls.get(channel_ref).cloned()
    }

    pub fn sent_to(&self, channel_ref: &str) -> Vec<Sent> {
        self.state()
            .sent
            .iter()
            .filter(|(r, _)| r == channel_ref)
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn texts_to(&self, channel_ref: &str) -> Vec<String> {
        self.sent_to(channel_ref)
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Make every send to the channel fail with a transient error.
    pub fn set_failing(&self, channel_ref: &str, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing.insert(channel_ref.to_string());
        } else {
            state.failing.remove(channel_ref);
        }
    }

    pub fn set_members(&self, members: Vec<KnownMember>) {
        self.state().members = members;
    }

    fn record(&self, channel_ref: &str, sent: Sent) -> Result<(), BotError> {
        let mut state = self.state();
        if state.failing.contains(channel_ref) {
            return Err(BotError::TransientExternal("injected failure".into()));
        }
        if !state.channels.values().any(|r| r == channel_ref) {
            return Err(BotError::NotFound(format!("channel {channel_ref}")));
        }
        state.sent.push((channel_ref.to_string(), sent));
        Ok(())
    }
}

#[async_trait]
impl ChannelProvider for FakeProvider {
    async fn channel_exists(&self, name: &str) -> Result<Option<String>, BotError> {
        Ok(self.live(name))
    }

    async fn create_channel(&self, name: &str, acl: &ChannelAcl) -> Result<String, BotError> {
        let channel_ref = self.add_channel(name);
        let mut state = self.state();
        state.created.push(name.to_string());
        state.acls.insert(channel_ref.clone(), acl.clone());
        Ok(channel_ref)
    }

    async fn delete_channel(&self, channel_ref: &str) -> Result<(), BotError> {
        let mut state = self.state();
        let before = state.channels.len();
        state.channels.retain(|_, r| r != channel_ref);
        if state.channels.len() == before {
            return Err(BotError::NotFound(format!("channel {channel_ref}")));
        }
        state.deleted.push(channel_ref.to_string());
        Ok(())
    }

    async fn send_text(&self, channel_ref: &str, text: &str) -> Result<(), BotError> {
        self.record(channel_ref, Sent::Text(text.to_string()))
    }

    async fn send_attachment(&self, channel_ref: &str, url: &str) -> Result<(), BotError> {
        self.record(channel_ref, Sent::Attachment(url.to_string()))
    }

    async fn send_ticket_intro(&self, channel_ref: &str, ticket: &Ticket) -> Result<(), BotError> {
        self.record(channel_ref, Sent::Intro(ticket.id))
    }

    async fn send_file(
        &self,
        channel_ref: &str,
        filename: &str,
        _bytes: Vec<u8>,
    ) -> Result<(), BotError> {
        self.record(channel_ref, Sent::File(filename.to_string()))
    }

    async fn list_members(&self) -> Result<Vec<KnownMember>, BotError> {
        Ok(self.state().members.clone())
    }
}

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap()
}

pub fn form(owner: &str) -> NewTicket {
    NewTicket {
        subject: "Lost items".into(),
        category: "Bug".into(),
        game: "eco".into(),
        server: "Eco-1".into(),
        description: "Items vanished after the restart".into(),
        owner_ref: Some(owner.into()),
    }
}

pub fn pending(ticket_id: i64, author: &str, content: &str, created_at: DateTime<Utc>) -> NewMessage {
    NewMessage::pending(ticket_id, author, content, created_at)
}

/// Reconciler and relay wired to a SQLite store and a fake guild.
pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub provider: Arc<FakeProvider>,
    pub relay: Relay,
    pub reconciler: Arc<Reconciler>,
    pub shutdown: watch::Sender<bool>,
}

impl Harness {
    pub fn new(grace: Duration) -> Self {
        Self::with(Arc::new(SqliteStore::new_in_memory().unwrap()), FakeProvider::new(), grace)
    }

    pub fn with(store: Arc<SqliteStore>, provider: Arc<FakeProvider>, grace: Duration) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let relay = Relay::new(store.clone(), provider.clone(), 2000);
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            provider.clone(),
            relay.clone(),
            Arc::new(TranscriptRenderer::new()),
            ReconcilerSettings {
                grace_delay: grace,
                ..Default::default()
            },
            shutdown_rx,
        ));
        Self {
            store,
            provider,
            relay,
            reconciler,
            shutdown,
        }
    }

    pub async fn ticket(&self, id: i64) -> Ticket {
        self.store.get_ticket(id).await.unwrap().unwrap()
    }

    /// Wait (in tokio time) until the channel received the given text.
    pub async fn wait_for_text(&self, channel_ref: &str, text: &str) {
        for _ in 0..1000 {
            if self.provider.texts_to(channel_ref).iter().any(|t| t == text) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("'{text}' never reached {channel_ref}");
    }
}
