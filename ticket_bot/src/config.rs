//! JSON configuration.
//!
//! Ids are Discord snowflakes kept as strings. Tunables default when absent,
//! everything that names a guild object is required.

use std::{collections::HashSet, fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::error::BotError;

/// Largest message body Discord accepts.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Maximum length of a component custom id.
pub const CUSTOM_ID_LIMIT: usize = 100;

const DEFAULT_CATEGORIES: [&str; 4] = ["Bug", "Shop Issue", "Connection Issue", "Other"];

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub guild_id: String,
    pub support_role_id: String,
    pub support_category_id: String,
    /// Receives closure embeds and transcripts.
    pub transcript_log_channel_id: String,
    #[serde(default = "default_categories")]
    pub ticket_categories: Vec<String>,
    #[serde(default)]
    pub games: Vec<GameConfig>,
    pub admin: AdminConfig,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default = "default_chunk_size")]
    pub message_chunk_size: usize,
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GameConfig {
    /// Short id used in component custom ids, e.g. `eco`.
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub suggestion_channel_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub role_id: String,
    #[serde(default)]
    pub user_ids: Vec<String>,
    pub log_channel_id: String,
    #[serde(default = "default_timeout_hours")]
    pub timeout_hours: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timings {
    pub reconcile_interval_secs: u64,
    pub drain_interval_secs: u64,
    pub suggestion_expiry_interval_secs: u64,
    pub grace_delay_secs: u64,
    pub orphan_sweep_window_secs: u64,
    pub vote_duration_hours: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 10,
            drain_interval_secs: 5,
            suggestion_expiry_interval_secs: 300,
            grace_delay_secs: 10,
            orphan_sweep_window_secs: 600,
            vote_duration_hours: 48,
        }
    }
}

impl Timings {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    pub fn suggestion_expiry_interval(&self) -> Duration {
        Duration::from_secs(self.suggestion_expiry_interval_secs)
    }

    pub fn grace_delay(&self) -> Duration {
        Duration::from_secs(self.grace_delay_secs)
    }

    pub fn orphan_sweep_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.orphan_sweep_window_secs as i64)
    }

    pub fn vote_duration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.vote_duration_hours as i64)
    }
}

fn default_categories() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

fn default_chunk_size() -> usize {
    DISCORD_MESSAGE_LIMIT
}

fn default_database_path() -> String {
    "tickets.db".to_string()
}

fn default_timeout_hours() -> u32 {
    12
}

fn is_snowflake(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

impl BotConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BotError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            BotError::Config(format!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_json(&raw)
            .map_err(|e| BotError::Config(format!("'{}': {e}", path.display())))
    }

    pub fn from_json(raw: &str) -> Result<Self, BotError> {
        let config: BotConfig = serde_json::from_str(raw)
            .map_err(|e| BotError::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BotError> {
        let ids = [
            ("guild_id", &self.guild_id),
            ("support_role_id", &self.support_role_id),
            ("support_category_id", &self.support_category_id),
            ("transcript_log_channel_id", &self.transcript_log_channel_id),
            ("admin.role_id", &self.admin.role_id),
            ("admin.log_channel_id", &self.admin.log_channel_id),
        ];
        for (name, value) in ids {
            if !is_snowflake(value) {
                return Err(BotError::Config(format!("'{name}' must be a Discord id")));
            }
        }
        if let Some(bad) = self.admin.user_ids.iter().find(|id| !is_snowflake(id)) {
            return Err(BotError::Config(format!("admin user id '{bad}' is not a Discord id")));
        }

        if self.ticket_categories.is_empty() {
            return Err(BotError::Config("'ticket_categories' cannot be empty".into()));
        }
        // Select menus hold at most 25 options.
        if self.ticket_categories.len() > 25 || self.games.len() > 25 {
            return Err(BotError::Config(
                "at most 25 ticket categories and 25 games are supported".into(),
            ));
        }

        if let Some(bad) = self
            .ticket_categories
            .iter()
            .find(|c| c.trim().is_empty() || c.contains(':'))
        {
            return Err(BotError::Config(format!(
                "ticket category '{bad}' must be non-empty and contain no ':'"
            )));
        }
        let longest_category = self.ticket_categories.iter().map(String::len).max().unwrap_or(0);

        let mut keys = HashSet::new();
        for game in &self.games {
            if game.key.is_empty() || game.key.contains(':') {
                return Err(BotError::Config(format!(
                    "game key '{}' must be non-empty and contain no ':'",
                    game.key
                )));
            }
            if !keys.insert(game.key.as_str()) {
                return Err(BotError::Config(format!("duplicate game key '{}'", game.key)));
            }
            // The whole ticket form travels in one modal custom id.
            let longest_server = game.servers.iter().map(String::len).max().unwrap_or(5);
            let form_id_len =
                "ticket_submission:".len() + longest_category + 1 + game.key.len() + 1 + longest_server;
            if form_id_len > CUSTOM_ID_LIMIT {
                return Err(BotError::Config(format!(
                    "names for game '{}' are too long to fit a component id",
                    game.key
                )));
            }
            if let Some(channel) = &game.suggestion_channel_id {
                if !is_snowflake(channel) {
                    return Err(BotError::Config(format!(
                        "suggestion channel of game '{}' is not a Discord id",
                        game.key
                    )));
                }
            }
        }

        if self.message_chunk_size == 0 || self.message_chunk_size > DISCORD_MESSAGE_LIMIT {
            return Err(BotError::Config(format!(
                "'message_chunk_size' must be between 1 and {DISCORD_MESSAGE_LIMIT}"
            )));
        }

        let t = &self.timings;
        if t.reconcile_interval_secs == 0
            || t.drain_interval_secs == 0
            || t.suggestion_expiry_interval_secs == 0
        {
            return Err(BotError::Config("poll intervals must be at least one second".into()));
        }
        // Discord caps timeouts at 28 days.
        if self.admin.timeout_hours == 0 || self.admin.timeout_hours > 28 * 24 {
            return Err(BotError::Config("'admin.timeout_hours' must be 1..=672".into()));
        }
        Ok(())
    }

    pub fn game(&self, key: &str) -> Option<&GameConfig> {
        self.games.iter().find(|g| g.key == key)
    }

    /// Servers offered for a game; unknown games and games without servers
    /// fall back to `Other`.
    pub fn servers_for(&self, key: &str) -> Vec<String> {
        match self.game(key) {
            Some(game) if !game.servers.is_empty() => game.servers.clone(),
            _ => vec!["Other".to_string()],
        }
    }

    pub fn is_admin_user(&self, user_id: &str) -> bool {
        self.admin.user_ids.iter().any(|id| id == user_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "guild_id": "100",
        "support_role_id": "200",
        "support_category_id": "300",
        "transcript_log_channel_id": "400",
        "games": [
            { "key": "eco", "label": "ECO", "servers": ["Eco-1", "Eco-2"], "suggestion_channel_id": "500" },
            { "key": "rust", "label": "Rust" }
        ],
        "admin": { "role_id": "600", "user_ids": ["700"], "log_channel_id": "800" }
    }"#;

    pub(crate) fn sample() -> BotConfig {
        BotConfig::from_json(SAMPLE).unwrap()
    }

    #[test]
    fn defaults_fill_tunables() {
        let config = sample();
        assert_eq!(config.timings.grace_delay(), Duration::from_secs(10));
        assert_eq!(config.timings.reconcile_interval_secs, 10);
        assert_eq!(config.timings.drain_interval_secs, 5);
        assert_eq!(config.admin.timeout_hours, 12);
        assert_eq!(config.message_chunk_size, 2000);
        assert_eq!(config.ticket_categories.len(), 4);
        assert_eq!(config.database_path, "tickets.db");
    }

    #[test]
    fn servers_fall_back_to_other() {
        let config = sample();
        assert_eq!(config.servers_for("eco"), vec!["Eco-1", "Eco-2"]);
        assert_eq!(config.servers_for("rust"), vec!["Other"]);
        assert_eq!(config.servers_for("missing"), vec!["Other"]);
    }

    #[test]
    fn rejects_bad_values() {
        let bad_id = SAMPLE.replace(r#""guild_id": "100""#, r#""guild_id": "abc""#);
        assert!(matches!(BotConfig::from_json(&bad_id), Err(BotError::Config(_))));

        let dup = SAMPLE.replace(r#""key": "rust""#, r#""key": "eco""#);
        assert!(BotConfig::from_json(&dup).is_err());

        let colon = SAMPLE.replace(r#""guild_id": "100","#, r#""guild_id": "100", "ticket_categories": ["Bug:Crash"],"#);
        assert!(BotConfig::from_json(&colon).is_err());

        let mut config = sample();
        config.games[0].servers = vec!["x".repeat(90)];
        assert!(config.validate().is_err());

        let mut config = sample();
        config.message_chunk_size = 2001;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.timings.drain_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = BotConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
