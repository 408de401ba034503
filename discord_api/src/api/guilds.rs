use async_trait::async_trait;
use serde::Serialize;

use crate::{
    client::{audit_reason, expect_success, parse_json_if_ok, DiscordClient},
    error::DiscordError,
    types::user::{Member, User},
    util::build_url,
};

/// Largest page `GET /guilds/{id}/members` returns.
pub const MEMBER_PAGE_LIMIT: u16 = 1000;

#[derive(Debug, Serialize)]
struct TimeoutBody<'a> {
    communication_disabled_until: Option<&'a str>,
}

#[async_trait]
pub trait GuildsApi {
    /// One page of guild members ordered by user id.
    async fn list_guild_members(
        &self,
        guild_id: &str,
        limit: u16,
        after: Option<&str>,
    ) -> Result<Vec<Member>, DiscordError>;

    async fn get_guild_member(&self, guild_id: &str, user_id: &str)
        -> Result<Member, DiscordError>;

    /// Time out a member until the given ISO8601 instant; `None` lifts it.
    async fn timeout_member(
        &self,
        guild_id: &str,
        user_id: &str,
        until: Option<&str>,
        reason: Option<&str>,
    ) -> Result<(), DiscordError>;

    async fn get_user(&self, user_id: &str) -> Result<User, DiscordError>;
}

#[async_trait]
impl GuildsApi for DiscordClient {
    async fn list_guild_members(
        &self,
        guild_id: &str,
        limit: u16,
        after: Option<&str>,
    ) -> Result<Vec<Member>, DiscordError> {
        let url = build_url(&self.base_url, &["guilds", guild_id, "members"]);
        let mut query = vec![("limit", limit.min(MEMBER_PAGE_LIMIT).to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        let resp = self.authed_get_with_query(&url, &query).await?;
        parse_json_if_ok(resp).await
    }

    async fn get_guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Member, DiscordError> {
        let url = build_url(&self.base_url, &["guilds", guild_id, "members", user_id]);
        let resp = self.authed_get(&url).await?;
        parse_json_if_ok(resp).await
    }

    async fn timeout_member(
        &self,
        guild_id: &str,
        user_id: &str,
        until: Option<&str>,
        reason: Option<&str>,
    ) -> Result<(), DiscordError> {
        let url = build_url(&self.base_url, &["guilds", guild_id, "members", user_id]);
        let body = TimeoutBody {
            communication_disabled_until: until,
        };
        let encoded = reason.map(audit_reason);
        let headers: Vec<(&str, &str)> = encoded
            .as_deref()
            .map(|r| vec![("X-Audit-Log-Reason", r)])
            .unwrap_or_default();
        let resp = self.authed_patch(&url, &body, Some(headers.as_slice())).await?;
        expect_success(resp).await
    }

    async fn get_user(&self, user_id: &str) -> Result<User, DiscordError> {
        let url = build_url(&self.base_url, &["users", user_id]);
        let resp = self.authed_get(&url).await?;
        parse_json_if_ok(resp).await
    }
}
