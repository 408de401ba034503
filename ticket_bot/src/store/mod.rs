//! Ticket persistence.
//!
//! The reconciler, relay and interaction handlers only see the
//! [`TicketStore`] trait. [`sqlite::SqliteStore`] is the production
//! implementation.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    MemberProfile, NewMessage, NewSuggestion, NewTicket, StoredMessage, Suggestion, Ticket,
    TicketFilter, TicketStatus,
};

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error during {operation}: {message}")]
    Storage { operation: String, message: String },

    #[error("corrupt {0} in database")]
    Corruption(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl StoreError {
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption(what.into())
    }
}

/// Everything the bot persists.
///
/// Ticket writes are column-scoped (`set_channel_ref`, `set_status`,
/// `reassign_owner`) so tasks running concurrently never overwrite each
/// other's fields.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Tickets in ascending id order.
    async fn list_tickets(&self, filter: TicketFilter) -> Result<Vec<Ticket>, StoreError>;

    async fn get_ticket(&self, id: i64) -> Result<Option<Ticket>, StoreError>;

    async fn find_ticket_by_channel(&self, channel_ref: &str)
        -> Result<Option<Ticket>, StoreError>;

    /// Insert an Open ticket without a channel. The owner profile is linked
    /// when `owner_ref` belongs to a registered member.
    async fn create_ticket(&self, ticket: NewTicket, now: DateTime<Utc>)
        -> Result<Ticket, StoreError>;

    /// Clears `provisioned` when the ref changes.
    async fn set_channel_ref(
        &self,
        id: i64,
        channel_ref: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Record that the channel setup finished. Returns false when the
    /// ticket no longer points at `channel_ref`.
    async fn mark_provisioned(&self, id: i64, channel_ref: &str) -> Result<bool, StoreError>;

    /// Returns whether the status actually changed.
    async fn set_status(
        &self,
        id: i64,
        status: TicketStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Replace the ticket's owner association with `profile` in one
    /// transaction and point `owner_ref` at the profile's Discord id.
    async fn reassign_owner(
        &self,
        id: i64,
        profile: &MemberProfile,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Profile ids currently associated with the ticket as owner.
    async fn owner_associations(&self, id: i64) -> Result<Vec<i64>, StoreError>;

    /// Undelivered messages by `created_at`, then id.
    async fn list_undelivered_messages(&self) -> Result<Vec<StoredMessage>, StoreError>;

    async fn mark_delivered(&self, message_id: i64) -> Result<(), StoreError>;

    /// All messages of a ticket by `created_at`, then id.
    async fn list_messages_for_ticket(&self, ticket_id: i64)
        -> Result<Vec<StoredMessage>, StoreError>;

    /// Returns the new row id, or `None` when a message with the same
    /// external ref is already stored.
    async fn insert_message(&self, message: NewMessage) -> Result<Option<i64>, StoreError>;

    async fn find_message_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<StoredMessage>, StoreError>;

    async fn update_message_content(
        &self,
        external_ref: &str,
        content: &str,
    ) -> Result<bool, StoreError>;

    async fn delete_message_by_external_ref(&self, external_ref: &str)
        -> Result<bool, StoreError>;

    async fn insert_member_profile(
        &self,
        display_name: &str,
        discord_id: Option<&str>,
    ) -> Result<MemberProfile, StoreError>;

    async fn find_profile_by_discord_id(
        &self,
        discord_id: &str,
    ) -> Result<Option<MemberProfile>, StoreError>;

    async fn list_profiles_by_discord_ids(
        &self,
        discord_ids: &[String],
    ) -> Result<Vec<MemberProfile>, StoreError>;

    async fn insert_suggestion(&self, suggestion: NewSuggestion) -> Result<Suggestion, StoreError>;

    async fn find_suggestion_by_message(
        &self,
        message_ref: &str,
    ) -> Result<Option<Suggestion>, StoreError>;

    /// Unlocked suggestions whose vote closed at or before `now`.
    async fn list_expired_suggestions(&self, now: DateTime<Utc>)
        -> Result<Vec<Suggestion>, StoreError>;

    /// Returns false when the suggestion was already locked.
    async fn lock_suggestion(&self, id: i64) -> Result<bool, StoreError>;
}
