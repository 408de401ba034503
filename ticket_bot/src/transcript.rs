//! HTML transcripts of a ticket's conversation.

use handlebars::Handlebars;
use serde::Serialize;

use crate::{error::BotError, model::StoredMessage};

const DEFAULT_AVATAR: &str = "https://cdn.discordapp.com/embed/avatars/0.png";

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Ticket #{{ticket_id}} transcript</title>
  <style>
    body { background: #36393f; color: #dcddde; font-family: "Segoe UI", sans-serif; margin: 24px; }
    h1 { color: #ffffff; font-size: 20px; }
    .message { display: flex; gap: 12px; padding: 8px 0; border-bottom: 1px solid #2f3136; }
    .avatar { width: 40px; height: 40px; border-radius: 50%; }
    .username { color: #ffffff; font-weight: 600; }
    .timestamp { color: #72767d; font-size: 12px; margin-left: 6px; }
    .content { white-space: pre-wrap; margin-top: 2px; }
    .attachment a { color: #00aff4; }
  </style>
</head>
<body>
  <h1>Ticket #{{ticket_id}}</h1>
  {{#each messages}}
  <div class="message">
    <img class="avatar" src="{{avatar_url}}" alt="avatar">
    <div>
      <span class="username">{{author}}</span><span class="timestamp">{{timestamp}}</span>
      <div class="content">{{content}}</div>
      {{#each attachments}}
      <div class="attachment"><a href="{{this}}">{{this}}</a></div>
      {{/each}}
    </div>
  </div>
  {{/each}}
</body>
</html>
"#;

#[derive(Serialize)]
struct TranscriptContext<'a> {
    ticket_id: i64,
    messages: Vec<TranscriptLine<'a>>,
}

#[derive(Serialize)]
struct TranscriptLine<'a> {
    author: &'a str,
    avatar_url: &'a str,
    timestamp: String,
    content: &'a str,
    attachments: &'a [String],
}

/// Renders transcripts. Values are HTML-escaped by handlebars.
pub struct TranscriptRenderer {
    handlebars: Handlebars<'static>,
}

impl Default for TranscriptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        Self { handlebars }
    }

    pub fn file_name(ticket_id: i64) -> String {
        format!("transcript-ticket-{ticket_id}.html")
    }

    pub fn render(&self, ticket_id: i64, messages: &[StoredMessage]) -> Result<String, BotError> {
        let context = TranscriptContext {
            ticket_id,
            messages: messages
                .iter()
                .map(|m| TranscriptLine {
                    author: if m.author_name.is_empty() { "Unknown" } else { &m.author_name },
                    avatar_url: m.author_avatar_url.as_deref().unwrap_or(DEFAULT_AVATAR),
                    timestamp: m.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    content: &m.content,
                    attachments: &m.attachments,
                })
                .collect(),
        };
        self.handlebars
            .render_template(TEMPLATE, &context)
            .map_err(|e| BotError::Config(format!("transcript template: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn escapes_content_and_lists_messages() {
        let message = StoredMessage {
            id: 1,
            ticket_id: 9,
            content: "<script>alert(1)</script> & more".into(),
            attachments: vec!["https://cdn/x.png".into()],
            author_name: "Mira".into(),
            author_ref: None,
            author_avatar_url: None,
            external_ref: None,
            created_at: Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap(),
            delivered: true,
        };
        let html = TranscriptRenderer::new().render(9, &[message]).unwrap();
        assert!(html.contains("Ticket #9"));
        assert!(html.contains("2025-02-03 04:05:06"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains(DEFAULT_AVATAR));
        assert!(html.contains("https://cdn/x.png"));
    }
}
