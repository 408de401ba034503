//! Rendering stored messages into channel sends.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::{model::StoredMessage, provider::KnownMember};

/// One call against the channel provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Attachment(String),
}

/// Lower-cased member name → user id.
#[derive(Debug, Default, Clone)]
pub struct MentionTable {
    by_name: HashMap<String, String>,
}

impl MentionTable {
    pub fn new(members: &[KnownMember]) -> Self {
        let mut by_name = HashMap::new();
        for member in members {
            for name in &member.names {
                by_name
                    .entry(name.to_lowercase())
                    .or_insert_with(|| member.id.clone());
            }
        }
        Self { by_name }
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Rewrite `@name` tokens of known members to `<@id>`.
    pub fn resolve(&self, text: &str) -> String {
        if self.by_name.is_empty() || !text.contains('@') {
            return text.to_string();
        }
        name_token()
            .replace_all(text, |caps: &Captures<'_>| {
                let lead = &caps[1];
                let name = &caps[2];
                match self.by_name.get(&name.to_lowercase()) {
                    Some(id) => format!("{lead}<@{id}>"),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

fn name_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(^|\s)@(\w[\w.]{0,30}\w)").expect("valid mention pattern")
    })
}

/// True when a text could contain a resolvable `@name`.
pub fn wants_mentions(text: &str) -> bool {
    name_token().is_match(text)
}

pub fn header(message: &StoredMessage) -> String {
    format!(
        "[{}] {}:",
        message.created_at.format("%H:%M"),
        message.author_name
    )
}

/// A single `http(s)` URL with nothing around it.
pub fn is_bare_url(text: &str) -> bool {
    let trimmed = text.trim();
    (trimmed.starts_with("https://") || trimmed.starts_with("http://"))
        && !trimmed.chars().any(char::is_whitespace)
}

/// Lines of one message's text part. The header leads the first line.
pub fn text_lines(message: &StoredMessage, text: &str) -> Vec<String> {
    let header = header(message);
    let text = text.trim_end();
    if text.is_empty() {
        return vec![header];
    }
    let mut lines = text.split('\n');
    let first = lines.next().unwrap_or_default();
    let mut out = vec![format!("{header} {first}")];
    out.extend(lines.map(str::to_string));
    out
}

/// Sends for a single message, in order.
pub fn render(message: &StoredMessage, mentions: &MentionTable, limit: usize) -> Vec<Outgoing> {
    let text = mentions.resolve(&message.content);
    let mut sends = Vec::new();

    if is_bare_url(&text) {
        sends.push(Outgoing::Text(header(message)));
        sends.push(Outgoing::Text(text.trim().to_string()));
    } else if !text.trim().is_empty() || !message.attachments.is_empty() {
        sends.extend(
            chunk(&text_lines(message, &text), limit)
                .into_iter()
                .map(Outgoing::Text),
        );
    }

    sends.extend(message.attachments.iter().cloned().map(Outgoing::Attachment));
    sends
}

/// Replay a ticket's history, packing consecutive messages into as few
/// sends as `limit` allows. Pending text is flushed before any attachment
/// or bare URL so those stay right after the text they belong to.
pub fn pack_history(
    messages: &[StoredMessage],
    mentions: &MentionTable,
    limit: usize,
) -> Vec<Outgoing> {
    let mut sends = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    fn flush(pending: &mut Vec<String>, sends: &mut Vec<Outgoing>, limit: usize) {
        if !pending.is_empty() {
            sends.extend(chunk(pending, limit).into_iter().map(Outgoing::Text));
            pending.clear();
        }
    }

    for message in messages {
        let text = mentions.resolve(&message.content);
        if is_bare_url(&text) {
            pending.push(header(message));
            flush(&mut pending, &mut sends, limit);
            sends.push(Outgoing::Text(text.trim().to_string()));
        } else if !text.trim().is_empty() || !message.attachments.is_empty() {
            pending.extend(text_lines(message, &text));
        }

        if !message.attachments.is_empty() {
            flush(&mut pending, &mut sends, limit);
            sends.extend(message.attachments.iter().cloned().map(Outgoing::Attachment));
        }
    }
    flush(&mut pending, &mut sends, limit);
    sends
}

/// Pack `lines` joined with `\n` into sends of at most `limit` bytes.
///
/// A line longer than `limit` is cut on UTF-8 character boundaries into
/// sends of its own.
pub fn chunk<S: AsRef<str>>(lines: &[S], limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut sends = Vec::new();
    let mut current: Option<String> = None;

    for line in lines {
        let line = line.as_ref();
        if line.len() > limit {
            sends.extend(current.take());
            sends.extend(split_line(line, limit).into_iter().map(str::to_string));
            continue;
        }
        match current.as_mut() {
            Some(buf) if buf.len() + 1 + line.len() <= limit => {
                buf.push('\n');
                buf.push_str(line);
            }
            Some(_) => {
                sends.extend(current.replace(line.to_string()));
            }
            None => current = Some(line.to_string()),
        }
    }
    sends.extend(current);
    sends
}

fn split_line(line: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    while line.len() - start > limit {
        let mut end = start + limit;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // A single character wider than the limit.
            end = start + line[start..].chars().next().map_or(1, char::len_utf8);
        }
        pieces.push(&line[start..end]);
        start = end;
    }
    pieces.push(&line[start..]);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: i64, author: &str, content: &str) -> StoredMessage {
        StoredMessage {
            id,
            ticket_id: 1,
            content: content.to_string(),
            attachments: Vec::new(),
            author_name: author.to_string(),
            author_ref: None,
            author_avatar_url: None,
            external_ref: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 9, 5, 0).unwrap(),
            delivered: false,
        }
    }

    fn texts(sends: &[Outgoing]) -> Vec<&str> {
        sends
            .iter()
            .map(|s| match s {
                Outgoing::Text(t) => t.as_str(),
                Outgoing::Attachment(u) => u.as_str(),
            })
            .collect()
    }

    #[test]
    fn chunk_packs_and_respects_limit() {
        let lines = ["aaaa", "bbbb", "cccc", "dd"];
        let sends = chunk(&lines, 9);
        assert_eq!(sends, vec!["aaaa\nbbbb", "cccc\ndd"]);
        assert!(sends.iter().all(|s| s.len() <= 9));
        assert_eq!(sends.join("\n"), lines.join("\n"));
    }

    #[test]
    fn chunk_splits_long_lines_on_char_boundaries() {
        let line = "héllo wörld ünïcode".repeat(20);
        let sends = chunk(&[line.as_str()], 7);
        assert!(sends.iter().all(|s| s.len() <= 7));
        assert_eq!(sends.concat(), line);
    }

    #[test]
    fn chunk_keeps_order_around_oversized_line() {
        let long = "x".repeat(12);
        let lines = ["a", long.as_str(), "b"];
        let sends = chunk(&lines, 5);
        assert_eq!(sends, vec!["a", "xxxxx", "xxxxx", "xx", "b"]);
    }

    #[test]
    fn render_formats_header_and_attachments() {
        let mut m = msg(1, "Mira", "hello there");
        m.attachments = vec!["https://cdn/a.png".into()];
        let sends = render(&m, &MentionTable::default(), 2000);
        assert_eq!(texts(&sends), ["[09:05] Mira: hello there", "https://cdn/a.png"]);
        assert!(matches!(sends[1], Outgoing::Attachment(_)));
    }

    #[test]
    fn render_sends_bare_url_alone() {
        let m = msg(1, "Mira", " https://example.com/clip ");
        let sends = render(&m, &MentionTable::default(), 2000);
        assert_eq!(texts(&sends), ["[09:05] Mira:", "https://example.com/clip"]);
    }

    #[test]
    fn mentions_resolve_known_names_only() {
        let table = MentionTable::new(&[KnownMember {
            id: "55".into(),
            names: vec!["Mira".into(), "mira_the_great".into()],
        }]);
        assert_eq!(
            table.resolve("@mira and @MIRA_the_great but not @bob or me@mira.com"),
            "<@55> and <@55> but not @bob or me@mira.com"
        );
        assert!(wants_mentions("hi @bob"));
        assert!(!wants_mentions("mail me@bob.com"));
    }

    #[test]
    fn history_is_packed_and_flushed_before_attachments() {
        let mut with_file = msg(2, "Support", "see file");
        with_file.attachments = vec!["https://cdn/log.txt".into()];
        let history = vec![msg(1, "Mira", "first"), with_file, msg(3, "Mira", "thanks")];

        let sends = pack_history(&history, &MentionTable::default(), 2000);
        assert_eq!(
            texts(&sends),
            [
                "[09:05] Mira: first\n[09:05] Support: see file",
                "https://cdn/log.txt",
                "[09:05] Mira: thanks",
            ]
        );
    }
}
