//! Output rendering: JSONL for machines, plain-text tables and thread views for humans.

use serde::Serialize;

use crate::{
    auth::AuthStatus,
    context::ThreadContext,
    domain::{ChatSummary, MessageRecord},
    Result,
};

/// Max lines of message text shown per row in tables.
pub const TABLE_TEXT_LINES: usize = 3;

/// Extra markers merged into a message's JSON line; only `true` flags are emitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageFlags {
    pub target: bool,
    pub replied_to: bool,
}

#[derive(Serialize)]
struct FlaggedMessage<'a> {
    #[serde(flatten)]
    record: &'a MessageRecord,
    #[serde(skip_serializing_if = "is_false")]
    target: bool,
    #[serde(skip_serializing_if = "is_false")]
    replied_to: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One message as a single JSON line (no trailing newline). Non-ASCII stays as-is.
pub fn message_jsonl(record: &MessageRecord, flags: MessageFlags) -> Result<String> {
    Ok(serde_json::to_string(&FlaggedMessage {
        record,
        target: flags.target,
        replied_to: flags.replied_to,
    })?)
}

pub fn chat_jsonl(chat: &ChatSummary) -> Result<String> {
    Ok(serde_json::to_string(chat)?)
}

/// JSONL for a thread. The replied-to message is flagged where it appears in
/// the window, or emitted first when it falls outside it.
pub fn thread_jsonl(ctx: &ThreadContext) -> Result<Vec<String>> {
    let replied_id = ctx.replied_to.as_ref().map(|r| r.id);
    let mut out = Vec::with_capacity(ctx.messages.len() + 1);
    if let Some(r) = &ctx.replied_to {
        if !ctx.messages.iter().any(|m| m.id == r.id) {
            out.push(message_jsonl(
                r,
                MessageFlags {
                    replied_to: true,
                    ..Default::default()
                },
            )?);
        }
    }
    for m in &ctx.messages {
        out.push(message_jsonl(
            m,
            MessageFlags {
                target: m.id == ctx.target_id,
                replied_to: Some(m.id) == replied_id,
            },
        )?);
    }
    Ok(out)
}

/// Keep at most `max_lines` lines; mark the cut with ` ...`.
pub fn truncate_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.to_string();
    }
    format!("{} ...", lines[..max_lines].join("\n"))
}

pub fn search_table(messages: &[MessageRecord]) -> String {
    let rows = messages
        .iter()
        .map(|m| {
            vec![
                m.date.format("%Y-%m-%d %H:%M").to_string(),
                m.chat_name.clone(),
                m.sender_name.clone(),
                truncate_lines(&m.text, TABLE_TEXT_LINES),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&["Date", "Chat", "Sender", "Message"], &[false; 4], &rows)
}

pub fn chats_table(chats: &[ChatSummary]) -> String {
    let rows = chats
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.kind.to_string(),
                if c.unread_count > 0 {
                    c.unread_count.to_string()
                } else {
                    String::new()
                },
                c.last_activity
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(
        &["Name", "Type", "Unread", "Last message"],
        &[false, false, true, false],
        &rows,
    )
}

/// Human thread view. The replied-to message sits above a separator; the
/// target line is marked with `>`.
pub fn thread_view(ctx: &ThreadContext) -> String {
    let mut out = String::new();
    if let Some(r) = &ctx.replied_to {
        out.push_str(&format!("  >> {}: {}\n", r.sender_name, r.text));
        out.push_str(&format!("  {}\n", "-".repeat(40)));
    }
    for m in &ctx.messages {
        let marker = if m.id == ctx.target_id { "> " } else { "  " };
        out.push_str(&format!(
            "{marker}[{}] {}: {}\n",
            m.date.format("%H:%M"),
            m.sender_name,
            m.text
        ));
    }
    out
}

pub fn auth_status_view(status: &AuthStatus) -> String {
    let mut out = String::new();
    out.push_str(if status.authenticated {
        "Status: authenticated\n"
    } else {
        "Status: not authenticated\n"
    });
    if let Some(phone) = &status.phone {
        out.push_str(&format!("Phone: {phone}\n"));
    }
    out.push_str(if status.session_exists {
        "Session: stored\n"
    } else {
        "Session: none\n"
    });
    out
}

/// Left/right aligned columns; multi-line cells span several physical lines.
fn render_table(headers: &[&str], right: &[bool], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            let w = cell.lines().map(|l| l.chars().count()).max().unwrap_or(0);
            widths[i] = widths[i].max(w);
        }
    }

    let pad = |s: &str, i: usize| {
        let fill = " ".repeat(widths[i].saturating_sub(s.chars().count()));
        if right[i] {
            format!("{fill}{s}")
        } else {
            format!("{s}{fill}")
        }
    };
    let join = |cells: Vec<String>| cells.join("  ").trim_end().to_string();

    let mut out = String::new();
    out.push_str(&join(
        headers.iter().enumerate().map(|(i, h)| pad(h, i)).collect(),
    ));
    out.push('\n');
    out.push_str(&join(widths.iter().map(|w| "-".repeat(*w)).collect()));
    out.push('\n');

    for row in rows {
        let cell_lines: Vec<Vec<&str>> = row.iter().map(|c| c.lines().collect()).collect();
        let height = cell_lines.iter().map(Vec::len).max().unwrap_or(0).max(1);
        for line in 0..height {
            let cells = cell_lines
                .iter()
                .enumerate()
                .map(|(i, l)| pad(l.get(line).copied().unwrap_or(""), i))
                .collect();
            out.push_str(&join(cells));
            out.push('\n');
        }
    }
    out
}
