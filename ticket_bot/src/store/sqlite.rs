//! SQLite implementation of [`TicketStore`].
//!
//! # Schema Versioning
//!
//! A `schema_version` table records the applied version. To change the
//! schema, bump `CURRENT_SCHEMA_VERSION` and add a step to
//! `run_migrations()`; steps run in order from the stored version.
//!
//! Timestamps are stored as Unix milliseconds so that ordering happens in SQL.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use super::{StoreError, TicketStore};
use crate::model::{
    MemberProfile, NewMessage, NewSuggestion, NewTicket, StoredMessage, Suggestion, Ticket,
    TicketFilter, TicketStatus,
};

const CURRENT_SCHEMA_VERSION: i64 = 3;

const TICKET_COLUMNS: &str = "id, status, channel_ref, owner_ref, owner_profile_id, subject, \
     category, game, server, description, created_at, updated_at, provisioned";

const MESSAGE_COLUMNS: &str = "id, ticket_id, content, attachments, author_name, author_ref, \
     author_avatar_url, external_ref, created_at, delivered";

const SUGGESTION_COLUMNS: &str =
    "id, game, channel_ref, message_ref, author_ref, title, description, closes_at, locked";

impl FromSql for TicketStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        TicketStatus::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown ticket status `{raw}`").into()))
    }
}

impl ToSql for TicketStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

fn millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn storage(operation: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |e| StoreError::storage(operation, e.to_string())
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        status: row.get(1)?,
        channel_ref: row.get(2)?,
        owner_ref: row.get(3)?,
        owner_profile_id: row.get(4)?,
        subject: row.get(5)?,
        category: row.get(6)?,
        game: row.get(7)?,
        server: row.get(8)?,
        description: row.get(9)?,
        created_at: from_millis(row.get(10)?),
        updated_at: from_millis(row.get(11)?),
        provisioned: row.get(12)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    let raw_attachments: String = row.get(3)?;
    let attachments: Vec<String> = serde_json::from_str(&raw_attachments)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(StoredMessage {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        content: row.get(2)?,
        attachments,
        author_name: row.get(4)?,
        author_ref: row.get(5)?,
        author_avatar_url: row.get(6)?,
        external_ref: row.get(7)?,
        created_at: from_millis(row.get(8)?),
        delivered: row.get(9)?,
    })
}

fn suggestion_from_row(row: &Row<'_>) -> rusqlite::Result<Suggestion> {
    Ok(Suggestion {
        id: row.get(0)?,
        game: row.get(1)?,
        channel_ref: row.get(2)?,
        message_ref: row.get(3)?,
        author_ref: row.get(4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        closes_at: from_millis(row.get(7)?),
        locked: row.get(8)?,
    })
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<MemberProfile> {
    Ok(MemberProfile {
        id: row.get(0)?,
        display_name: row.get(1)?,
        discord_id: row.get(2)?,
    })
}

fn query_ticket(conn: &Connection, id: i64) -> Result<Option<Ticket>, StoreError> {
    conn.query_row(
        &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
        params![id],
        ticket_from_row,
    )
    .optional()
    .map_err(storage("get ticket"))
}

/// SQLite-backed ticket store.
///
/// rusqlite is synchronous, so every call runs on the blocking pool via
/// `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply pending migrations.
    ///
    /// File databases run with `journal_mode = WAL` and `busy_timeout = 5000`
    /// so the website process can write tickets while the bot polls.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref).map_err(storage("open database"))?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(storage("set journal_mode"))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            warn!(%journal_mode, "SQLite refused WAL mode, continuing with it");
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(storage("configure pragmas"))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(storage("create schema_version table"))?;

        let current_version: i64 = conn
            .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(storage("get schema version"))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;
        debug!(path = %path_str, version = CURRENT_SCHEMA_VERSION, "ticket store ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), StoreError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::storage(
                "schema version",
                format!(
                    "Database schema version {from_version} is newer than supported version \
                     {CURRENT_SCHEMA_VERSION}. Please upgrade the bot."
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS member_profiles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    display_name TEXT NOT NULL,
                    discord_id TEXT UNIQUE
                );

                CREATE TABLE IF NOT EXISTS tickets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    status TEXT NOT NULL,
                    channel_ref TEXT,
                    owner_ref TEXT,
                    owner_profile_id INTEGER REFERENCES member_profiles(id),
                    subject TEXT NOT NULL DEFAULT '',
                    category TEXT NOT NULL DEFAULT '',
                    game TEXT NOT NULL DEFAULT '',
                    server TEXT NOT NULL DEFAULT '',
                    description TEXT NOT NULL DEFAULT '',
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
                CREATE INDEX IF NOT EXISTS idx_tickets_channel
                    ON tickets(channel_ref) WHERE channel_ref IS NOT NULL;

                CREATE TABLE IF NOT EXISTS ticket_owners (
                    ticket_id INTEGER NOT NULL REFERENCES tickets(id),
                    profile_id INTEGER NOT NULL REFERENCES member_profiles(id),
                    assigned_at INTEGER NOT NULL,
                    PRIMARY KEY (ticket_id, profile_id)
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_ticket_owners_current
                    ON ticket_owners(ticket_id);

                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL REFERENCES tickets(id),
                    content TEXT NOT NULL,
                    attachments TEXT NOT NULL DEFAULT '[]',
                    author_name TEXT NOT NULL,
                    author_ref TEXT,
                    author_avatar_url TEXT,
                    external_ref TEXT UNIQUE,
                    created_at INTEGER NOT NULL,
                    delivered INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_messages_undelivered
                    ON messages(created_at, id) WHERE delivered = 0;
                CREATE INDEX IF NOT EXISTS idx_messages_ticket
                    ON messages(ticket_id, created_at, id);
                "#,
            )
            .map_err(storage("migration v1"))?;
        }

        // v2: suggestions move from message scraping into the database.
        if from_version < 2 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS suggestions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    game TEXT NOT NULL,
                    channel_ref TEXT NOT NULL,
                    message_ref TEXT NOT NULL UNIQUE,
                    author_ref TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    closes_at INTEGER NOT NULL,
                    locked INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_suggestions_open
                    ON suggestions(closes_at) WHERE locked = 0;
                "#,
            )
            .map_err(storage("migration v2"))?;
        }

        // v3: channel setup is tracked so a failed intro or backfill is retried.
        if from_version < 3 {
            conn.execute_batch(
                r#"
                ALTER TABLE tickets ADD COLUMN provisioned INTEGER NOT NULL DEFAULT 0;
                UPDATE tickets SET provisioned = 1 WHERE channel_ref IS NOT NULL;
                "#,
            )
            .map_err(storage("migration v3"))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(storage("update schema version"))?;

        Ok(())
    }

    /// Create a fresh in-memory store.
    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::storage(operation, "connection mutex poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::storage(operation, e.to_string()))?
    }
}

#[async_trait]
impl TicketStore for SqliteStore {
    async fn list_tickets(&self, filter: TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        self.with_conn("list tickets", move |conn| {
            let (sql, status) = match filter {
                TicketFilter::All => (
                    format!("SELECT {TICKET_COLUMNS} FROM tickets ORDER BY id"),
                    None,
                ),
                TicketFilter::Status(s) => (
                    format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE status = ?1 ORDER BY id"),
                    Some(s),
                ),
            };
            let mut stmt = conn.prepare(&sql).map_err(storage("list tickets"))?;
            let rows = match status {
                Some(s) => stmt.query_map(params![s], ticket_from_row),
                None => stmt.query_map([], ticket_from_row),
            }
            .map_err(storage("list tickets"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|_| StoreError::corruption("ticket row"))
        })
        .await
    }

    async fn get_ticket(&self, id: i64) -> Result<Option<Ticket>, StoreError> {
        self.with_conn("get ticket", move |conn| query_ticket(conn, id))
            .await
    }

    async fn find_ticket_by_channel(
        &self,
        channel_ref: &str,
    ) -> Result<Option<Ticket>, StoreError> {
        let channel_ref = channel_ref.to_string();
        self.with_conn("find ticket by channel", move |conn| {
            conn.query_row(
                &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE channel_ref = ?1"),
                params![channel_ref],
                ticket_from_row,
            )
            .optional()
            .map_err(storage("find ticket by channel"))
        })
        .await
    }

    async fn create_ticket(
        &self,
        ticket: NewTicket,
        now: DateTime<Utc>,
    ) -> Result<Ticket, StoreError> {
        self.with_conn("create ticket", move |conn| {
            let tx = conn.transaction().map_err(storage("create ticket"))?;

            let profile_id: Option<i64> = match &ticket.owner_ref {
                Some(owner) => tx
                    .query_row(
                        "SELECT id FROM member_profiles WHERE discord_id = ?1",
                        params![owner],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(storage("create ticket"))?,
                None => None,
            };

            tx.execute(
                "INSERT INTO tickets (status, owner_ref, owner_profile_id, subject, category,
                                      game, server, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    TicketStatus::Open,
                    ticket.owner_ref,
                    profile_id,
                    ticket.subject,
                    ticket.category,
                    ticket.game,
                    ticket.server,
                    ticket.description,
                    millis(now),
                ],
            )
            .map_err(storage("create ticket"))?;
            let id = tx.last_insert_rowid();

            if let Some(profile_id) = profile_id {
                tx.execute(
                    "INSERT INTO ticket_owners (ticket_id, profile_id, assigned_at)
                     VALUES (?1, ?2, ?3)",
                    params![id, profile_id, millis(now)],
                )
                .map_err(storage("link ticket owner"))?;
            }

            let created = query_ticket(&tx, id)?
                .ok_or_else(|| StoreError::NotFound(format!("ticket {id}")))?;
            tx.commit().map_err(storage("create ticket"))?;
            Ok(created)
        })
        .await
    }

    async fn set_channel_ref(
        &self,
        id: i64,
        channel_ref: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let channel_ref = channel_ref.map(str::to_string);
        self.with_conn("set channel ref", move |conn| {
            let changed = conn
                .execute(
                    "UPDATE tickets
                     SET provisioned = CASE WHEN channel_ref IS ?2 THEN provisioned ELSE 0 END,
                         channel_ref = ?2,
                         updated_at = MAX(updated_at, ?3)
                     WHERE id = ?1",
                    params![id, channel_ref, millis(now)],
                )
                .map_err(storage("set channel ref"))?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("ticket {id}")));
            }
            Ok(())
        })
        .await
    }

    async fn mark_provisioned(&self, id: i64, channel_ref: &str) -> Result<bool, StoreError> {
        let channel_ref = channel_ref.to_string();
        self.with_conn("mark provisioned", move |conn| {
            let changed = conn
                .execute(
                    "UPDATE tickets SET provisioned = 1 WHERE id = ?1 AND channel_ref = ?2",
                    params![id, channel_ref],
                )
                .map_err(storage("mark provisioned"))?;
            Ok(changed > 0)
        })
        .await
    }

    async fn set_status(
        &self,
        id: i64,
        status: TicketStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.with_conn("set status", move |conn| {
            let changed = conn
                .execute(
                    "UPDATE tickets SET status = ?2, updated_at = MAX(updated_at, ?3)
                     WHERE id = ?1 AND status != ?2",
                    params![id, status, millis(now)],
                )
                .map_err(storage("set status"))?;
            if changed > 0 {
                return Ok(true);
            }
            match query_ticket(conn, id)? {
                Some(_) => Ok(false),
                None => Err(StoreError::NotFound(format!("ticket {id}"))),
            }
        })
        .await
    }

    async fn reassign_owner(
        &self,
        id: i64,
        profile: &MemberProfile,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let profile = profile.clone();
        self.with_conn("reassign owner", move |conn| {
            let tx = conn.transaction().map_err(storage("reassign owner"))?;

            let updated = tx
                .execute(
                    "UPDATE tickets SET owner_ref = ?2, owner_profile_id = ?3,
                                        updated_at = MAX(updated_at, ?4)
                     WHERE id = ?1",
                    params![id, profile.discord_id, profile.id, millis(now)],
                )
                .map_err(storage("reassign owner"))?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("ticket {id}")));
            }

            tx.execute("DELETE FROM ticket_owners WHERE ticket_id = ?1", params![id])
                .map_err(storage("remove previous owner"))?;
            tx.execute(
                "INSERT INTO ticket_owners (ticket_id, profile_id, assigned_at) VALUES (?1, ?2, ?3)",
                params![id, profile.id, millis(now)],
            )
            .map_err(storage("insert new owner"))?;

            tx.commit().map_err(storage("reassign owner"))
        })
        .await
    }

    async fn owner_associations(&self, id: i64) -> Result<Vec<i64>, StoreError> {
        self.with_conn("owner associations", move |conn| {
            let mut stmt = conn
                .prepare("SELECT profile_id FROM ticket_owners WHERE ticket_id = ?1")
                .map_err(storage("owner associations"))?;
            let rows = stmt
                .query_map(params![id], |row| row.get(0))
                .map_err(storage("owner associations"))?;
            rows.collect::<Result<Vec<i64>, _>>()
                .map_err(storage("owner associations"))
        })
        .await
    }

    async fn list_undelivered_messages(&self) -> Result<Vec<StoredMessage>, StoreError> {
        self.with_conn("list undelivered messages", |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE delivered = 0
                     ORDER BY created_at, id"
                ))
                .map_err(storage("list undelivered messages"))?;
            let rows = stmt
                .query_map([], message_from_row)
                .map_err(storage("list undelivered messages"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|_| StoreError::corruption("message row"))
        })
        .await
    }

    async fn mark_delivered(&self, message_id: i64) -> Result<(), StoreError> {
        self.with_conn("mark delivered", move |conn| {
            conn.execute(
                "UPDATE messages SET delivered = 1 WHERE id = ?1",
                params![message_id],
            )
            .map_err(storage("mark delivered"))?;
            Ok(())
        })
        .await
    }

    async fn list_messages_for_ticket(
        &self,
        ticket_id: i64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        self.with_conn("list messages for ticket", move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE ticket_id = ?1
                     ORDER BY created_at, id"
                ))
                .map_err(storage("list messages for ticket"))?;
            let rows = stmt
                .query_map(params![ticket_id], message_from_row)
                .map_err(storage("list messages for ticket"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|_| StoreError::corruption("message row"))
        })
        .await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Option<i64>, StoreError> {
        let attachments = serde_json::to_string(&message.attachments)
            .map_err(|e| StoreError::storage("serialize attachments", e.to_string()))?;
        self.with_conn("insert message", move |conn| {
            let inserted = conn
                .execute(
                    "INSERT INTO messages (ticket_id, content, attachments, author_name, author_ref,
                                           author_avatar_url, external_ref, created_at, delivered)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(external_ref) DO NOTHING",
                    params![
                        message.ticket_id,
                        message.content,
                        attachments,
                        message.author_name,
                        message.author_ref,
                        message.author_avatar_url,
                        message.external_ref,
                        millis(message.created_at),
                        message.delivered,
                    ],
                )
                .map_err(storage("insert message"))?;
            Ok((inserted > 0).then(|| conn.last_insert_rowid()))
        })
        .await
    }

    async fn find_message_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<StoredMessage>, StoreError> {
        let external_ref = external_ref.to_string();
        self.with_conn("find message", move |conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE external_ref = ?1"),
                params![external_ref],
                message_from_row,
            )
            .optional()
            .map_err(storage("find message"))
        })
        .await
    }

    async fn update_message_content(
        &self,
        external_ref: &str,
        content: &str,
    ) -> Result<bool, StoreError> {
        let external_ref = external_ref.to_string();
        let content = content.to_string();
        self.with_conn("update message content", move |conn| {
            let changed = conn
                .execute(
                    "UPDATE messages SET content = ?2 WHERE external_ref = ?1",
                    params![external_ref, content],
                )
                .map_err(storage("update message content"))?;
            Ok(changed > 0)
        })
        .await
    }

    async fn delete_message_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<bool, StoreError> {
        let external_ref = external_ref.to_string();
        self.with_conn("delete message", move |conn| {
            let changed = conn
                .execute(
                    "DELETE FROM messages WHERE external_ref = ?1",
                    params![external_ref],
                )
                .map_err(storage("delete message"))?;
            Ok(changed > 0)
        })
        .await
    }

    async fn insert_member_profile(
        &self,
        display_name: &str,
        discord_id: Option<&str>,
    ) -> Result<MemberProfile, StoreError> {
        let display_name = display_name.to_string();
        let discord_id = discord_id.map(str::to_string);
        self.with_conn("insert member profile", move |conn| {
            conn.execute(
                "INSERT INTO member_profiles (display_name, discord_id) VALUES (?1, ?2)",
                params![display_name, discord_id],
            )
            .map_err(storage("insert member profile"))?;
            Ok(MemberProfile {
                id: conn.last_insert_rowid(),
                display_name,
                discord_id,
            })
        })
        .await
    }

    async fn find_profile_by_discord_id(
        &self,
        discord_id: &str,
    ) -> Result<Option<MemberProfile>, StoreError> {
        let discord_id = discord_id.to_string();
        self.with_conn("find profile", move |conn| {
            conn.query_row(
                "SELECT id, display_name, discord_id FROM member_profiles WHERE discord_id = ?1",
                params![discord_id],
                profile_from_row,
            )
            .optional()
            .map_err(storage("find profile"))
        })
        .await
    }

    async fn list_profiles_by_discord_ids(
        &self,
        discord_ids: &[String],
    ) -> Result<Vec<MemberProfile>, StoreError> {
        if discord_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = discord_ids.to_vec();
        self.with_conn("list profiles", move |conn| {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT id, display_name, discord_id FROM member_profiles
                     WHERE discord_id IN ({placeholders}) ORDER BY display_name"
                ))
                .map_err(storage("list profiles"))?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), profile_from_row)
                .map_err(storage("list profiles"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(storage("list profiles"))
        })
        .await
    }

    async fn insert_suggestion(&self, suggestion: NewSuggestion) -> Result<Suggestion, StoreError> {
        self.with_conn("insert suggestion", move |conn| {
            conn.execute(
                "INSERT INTO suggestions (game, channel_ref, message_ref, author_ref, title,
                                          description, closes_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    suggestion.game,
                    suggestion.channel_ref,
                    suggestion.message_ref,
                    suggestion.author_ref,
                    suggestion.title,
                    suggestion.description,
                    millis(suggestion.closes_at),
                ],
            )
            .map_err(storage("insert suggestion"))?;
            Ok(Suggestion {
                id: conn.last_insert_rowid(),
                game: suggestion.game,
                channel_ref: suggestion.channel_ref,
                message_ref: suggestion.message_ref,
                author_ref: suggestion.author_ref,
                title: suggestion.title,
                description: suggestion.description,
                closes_at: suggestion.closes_at,
                locked: false,
            })
        })
        .await
    }

    async fn find_suggestion_by_message(
        &self,
        message_ref: &str,
    ) -> Result<Option<Suggestion>, StoreError> {
        let message_ref = message_ref.to_string();
        self.with_conn("find suggestion", move |conn| {
            conn.query_row(
                &format!("SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE message_ref = ?1"),
                params![message_ref],
                suggestion_from_row,
            )
            .optional()
            .map_err(storage("find suggestion"))
        })
        .await
    }

    async fn list_expired_suggestions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Suggestion>, StoreError> {
        self.with_conn("list expired suggestions", move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SUGGESTION_COLUMNS} FROM suggestions
                     WHERE locked = 0 AND closes_at <= ?1 ORDER BY closes_at, id"
                ))
                .map_err(storage("list expired suggestions"))?;
            let rows = stmt
                .query_map(params![millis(now)], suggestion_from_row)
                .map_err(storage("list expired suggestions"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(storage("list expired suggestions"))
        })
        .await
    }

    async fn lock_suggestion(&self, id: i64) -> Result<bool, StoreError> {
        self.with_conn("lock suggestion", move |conn| {
            let changed = conn
                .execute(
                    "UPDATE suggestions SET locked = 1 WHERE id = ?1 AND locked = 0",
                    params![id],
                )
                .map_err(storage("lock suggestion"))?;
            Ok(changed > 0)
        })
        .await
    }
}
