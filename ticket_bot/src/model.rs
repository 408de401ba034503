//! Persisted records shared by the store, the reconciler and the relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closed => "Closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Open" => Some(Self::Open),
            "Closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Canonical channel name for a ticket. Channel existence is checked by
/// this name, not only by the stored ref.
pub fn channel_name(ticket_id: i64) -> String {
    format!("ticket-{ticket_id}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub id: i64,
    pub status: TicketStatus,
    /// Set only while a live channel exists. Written by the reconciler alone.
    pub channel_ref: Option<String>,
    pub owner_ref: Option<String>,
    pub owner_profile_id: Option<i64>,
    pub subject: String,
    pub category: String,
    pub game: String,
    pub server: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The live channel got its intro, transcript and history. Cleared
    /// whenever `channel_ref` changes.
    pub provisioned: bool,
}

impl Ticket {
    pub fn channel_name(&self) -> String {
        channel_name(self.id)
    }

    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }
}

/// Form data for a new ticket.
#[derive(Debug, Clone, Default)]
pub struct NewTicket {
    pub subject: String,
    pub category: String,
    pub game: String,
    pub server: String,
    pub description: String,
    pub owner_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketFilter {
    All,
    Status(TicketStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: i64,
    pub ticket_id: i64,
    pub content: String,
    pub attachments: Vec<String>,
    pub author_name: String,
    pub author_ref: Option<String>,
    pub author_avatar_url: Option<String>,
    /// Discord message id for messages that originated in Discord.
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub ticket_id: i64,
    pub content: String,
    pub attachments: Vec<String>,
    pub author_name: String,
    pub author_ref: Option<String>,
    pub author_avatar_url: Option<String>,
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
}

impl NewMessage {
    /// A message typed on the website side, waiting for the relay.
    pub fn pending(ticket_id: i64, author_name: &str, content: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            ticket_id,
            content: content.to_string(),
            attachments: Vec::new(),
            author_name: author_name.to_string(),
            author_ref: None,
            author_avatar_url: None,
            external_ref: None,
            created_at,
            delivered: false,
        }
    }
}

/// A registered community member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberProfile {
    pub id: i64,
    pub display_name: String,
    pub discord_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub id: i64,
    pub game: String,
    pub channel_ref: String,
    pub message_ref: String,
    pub author_ref: String,
    pub title: String,
    pub description: String,
    pub closes_at: DateTime<Utc>,
    pub locked: bool,
}

#[derive(Debug, Clone)]
pub struct NewSuggestion {
    pub game: String,
    pub channel_ref: String,
    pub message_ref: String,
    pub author_ref: String,
    pub title: String,
    pub description: String,
    pub closes_at: DateTime<Utc>,
}
