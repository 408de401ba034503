//! Embeds and component rows the bot posts.

use chrono::{DateTime, Utc};
use discord_api::{
    types::component::{BUTTON_DANGER, BUTTON_PRIMARY, BUTTON_SECONDARY, BUTTON_SUCCESS},
    Component, Embed, User,
};

use crate::model::Ticket;

pub const GREEN: u32 = 0x2ECC71;
pub const ORANGE: u32 = 0xE67E22;
pub const RED: u32 = 0xE74C3C;
pub const GREY: u32 = 0x95A5A6;

const LOGO: &str = "https://i.imgur.com/dnlokbX.png";

pub const VOTE_UP: &str = "👍";
pub const VOTE_DOWN: &str = "👎";

/// Marker the expiry task and the vote guard look for.
pub const VOTE_CLOSES_PREFIX: &str = "Vote closes in:";

pub fn capitalize(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `someUSER#0001` → `Someuser`.
pub fn format_name(raw: &str) -> String {
    let name = raw.split('#').next().unwrap_or_default();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => "Unknown".to_string(),
    }
}

/// The first message of every ticket channel.
pub fn ticket_intro(ticket: &Ticket, owner: Option<&User>, now: DateTime<Utc>) -> Embed {
    let owner_name = owner
        .map(|u| format_name(&u.username))
        .unwrap_or_else(|| "Unknown".to_string());

    Embed::new()
        .title(format!("🎫 Ticket #{} - {}", ticket.id, capitalize(&ticket.subject)))
        .author(owner_name.clone(), owner.map(User::avatar_url))
        .description("--------------------------------------\n")
        .thumbnail(LOGO)
        .field("📂 **Category**", ticket.category.clone(), false)
        .field("🎮 **Game**", ticket.game.clone(), false)
        .field("🗺️ **Server**", ticket.server.clone(), false)
        .field("\u{200B}", "\u{200B}", false)
        .field(
            "📜 **Description**",
            format!("```{}```", capitalize(&ticket.description)),
            false,
        )
        .color(GREEN)
        .footer(format!("Ticket created by {owner_name}"))
        .timestamp(now.to_rfc3339())
}

/// Swap the owner shown on an existing intro embed.
pub fn with_owner(intro: Embed, owner: &User) -> Embed {
    let name = format_name(&owner.username);
    intro
        .author(name.clone(), Some(owner.avatar_url()))
        .footer(format!("Ticket reassigned to {name}"))
}

pub fn ticket_controls(ticket_id: i64) -> Vec<Component> {
    vec![Component::action_row(vec![
        Component::button(BUTTON_DANGER, "Close Ticket", format!("close_ticket_{ticket_id}")),
        Component::button(
            BUTTON_PRIMARY,
            "Reassign Owner",
            format!("reassign_owner_{ticket_id}"),
        ),
    ])]
}

/// Archive entry posted to the transcript log channel on close.
pub fn closure_log(
    ticket: &Ticket,
    closed_by: &str,
    owner: Option<&User>,
    closed_at: DateTime<Utc>,
) -> Embed {
    let mut embed = Embed::new()
        .thumbnail(LOGO)
        .color(GREEN)
        .field("Ticket Closed By", format!("<@{closed_by}>"), true)
        .field("Ticket Name", format!("Ticket-{}", ticket.id), true)
        .field("Subject", non_empty(&ticket.subject), true)
        .field("Category", non_empty(&ticket.category), true)
        .field("Game", non_empty(&ticket.game), true)
        .field(
            "📜 **Description**",
            format!("```{}```", capitalize(non_empty(&ticket.description))),
            false,
        )
        .field(
            "🔒 Closed At",
            closed_at.format("%Y-%m-%d %I:%M %p UTC").to_string(),
            false,
        )
        .footer("Closed Ticket Archive")
        .timestamp(closed_at.to_rfc3339());
    if let Some(owner) = owner {
        embed = embed.author(owner.username.clone(), Some(owner.avatar_url()));
    }
    embed
}

pub fn closure_controls(ticket_id: i64) -> Vec<Component> {
    vec![Component::action_row(vec![
        Component::button(BUTTON_SECONDARY, "Transcript", format!("transcript_{ticket_id}"))
            .with_emoji("📜"),
        Component::button(BUTTON_SUCCESS, "Reopen", format!("reopen_ticket_{ticket_id}"))
            .with_emoji("🔓"),
    ])]
}

pub fn ticket_panel() -> (Embed, Vec<Component>) {
    let embed = Embed::new()
        .title("🎫 Ticket Guidelines")
        .description(
            "Before creating a ticket, please review the following rules:\n\
             • Tickets made on behalf of others will be closed immediately without response.\n\
             • Duplicate tickets from the same tribe will be closed immediately without response.\n\
             • Tickets not being prioritized over gameplay will be closed due to inactivity.\n\n\
             **You must have a registered account to create a ticket.**\n\n\
             **Click the button below to create a ticket:**",
        )
        .color(GREEN)
        .footer("Failure to follow these guidelines may result in ticket closure.");
    let row = Component::action_row(vec![Component::button(
        BUTTON_PRIMARY,
        "✉️ Create Ticket",
        "open_ticket_form",
    )]);
    (embed, vec![row])
}

pub fn suggestion_panel(game_label: &str, game_key: &str) -> (Embed, Vec<Component>) {
    let embed = Embed::new()
        .title(format!("💡 {game_label} Suggestions"))
        .description("Have an idea for the server? Press the button below to submit it for a community vote.")
        .color(ORANGE);
    let row = Component::action_row(vec![Component::button(
        BUTTON_SUCCESS,
        "Make a Suggestion",
        format!("suggestion-modal-{game_key}"),
    )]);
    (embed, vec![row])
}

pub fn suggestion(
    title: &str,
    description: &str,
    author: &User,
    closes_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Embed {
    Embed::new()
        .title(format!("📌 {title}"))
        .description(description)
        .field(
            "\u{200B}",
            format!("{VOTE_CLOSES_PREFIX} <t:{}:R>", closes_at.timestamp()),
            false,
        )
        .footer(format!("Suggested by {}", author.username))
        .color(ORANGE)
        .timestamp(now.to_rfc3339())
}

const RESULT_FIELD: &str = "🗳️ Voting closed";

/// Replace the countdown field with the final tally.
pub fn suggestion_result(mut embed: Embed, up: u32, down: u32) -> Embed {
    embed
        .fields
        .retain(|f| !f.value.starts_with(VOTE_CLOSES_PREFIX) && f.name != RESULT_FIELD);
    let (verdict, color) = if up > down {
        ("✅ Accepted by the community", GREEN)
    } else if down > up {
        ("❌ Rejected by the community", RED)
    } else {
        ("⚖️ Tied vote", GREY)
    };
    embed
        .field(RESULT_FIELD, format!("{VOTE_UP} {up}  |  {VOTE_DOWN} {down}\n{verdict}"), false)
        .color(color)
}

pub fn timeout_log(user: &User, hours: u32, now: DateTime<Utc>) -> Embed {
    Embed::new()
        .author(user.username.clone(), Some(user.avatar_url()))
        .thumbnail(LOGO)
        .color(GREEN)
        .field("Disciplinary Action", "Timeout", true)
        .field("Duration", format!("{hours} hours"), true)
        .field("Reason", "Mentioned admin", true)
        .field("User", user.mention(), true)
        .timestamp(now.to_rfc3339())
}

pub fn deletion_reason(reason: &str) -> Embed {
    Embed::new()
        .description(format!("🛑 A message was deleted for the following reason:\n> {reason}"))
        .color(RED)
}

fn non_empty(value: &str) -> &str {
    if value.trim().is_empty() {
        "N/A"
    } else {
        value
    }
}
