use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tgcli_core::{
    context::DEFAULT_CONTEXT,
    domain::MessageId,
    query::{DEFAULT_READ_LIMIT, DEFAULT_SEARCH_LIMIT},
    Error,
};

pub const DEFAULT_CHATS_LIMIT: usize = 100;

#[derive(Debug, Parser)]
#[command(
    name = "tg",
    version,
    about = "Search and read Telegram messages from the terminal."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List chats, optionally filtered by name.
    Chats {
        /// Case-insensitive substring of the chat name.
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, default_value_t = DEFAULT_CHATS_LIMIT)]
        limit: usize,
        /// Table output instead of JSONL.
        #[arg(long)]
        pretty: bool,
    },
    /// Search messages across chats, or within one chat.
    Search {
        query: String,
        /// Limit search to a specific chat.
        #[arg(long, allow_negative_numbers = true)]
        chat: Option<String>,
        /// Filter by sender (`me`, `@username`, or a name).
        #[arg(long = "from")]
        from_user: Option<String>,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
        /// Only messages on or after this date (YYYY-MM-DD).
        #[arg(long)]
        after: Option<String>,
        /// Only messages before this date (YYYY-MM-DD).
        #[arg(long)]
        before: Option<String>,
        #[arg(long)]
        pretty: bool,
    },
    /// Read recent messages from a chat.
    Read {
        #[arg(allow_negative_numbers = true)]
        chat: String,
        #[arg(long, default_value_t = DEFAULT_READ_LIMIT)]
        limit: usize,
        #[arg(long)]
        after: Option<String>,
        #[arg(long)]
        before: Option<String>,
        /// Oldest first.
        #[arg(long)]
        reverse: bool,
        /// Only messages containing this text (case-insensitive).
        #[arg(long)]
        query: Option<String>,
        #[arg(long = "from")]
        from_user: Option<String>,
        #[arg(long)]
        pretty: bool,
    },
    /// View a message with surrounding context.
    Thread {
        #[arg(allow_negative_numbers = true)]
        chat: String,
        message_id: MessageId,
        /// Messages before/after the target.
        #[arg(long, default_value_t = DEFAULT_CONTEXT)]
        context: usize,
        #[arg(long)]
        pretty: bool,
    },
    /// Manage Telegram authentication. Without a subcommand: set up, then log in or show status.
    Auth {
        #[command(subcommand)]
        command: Option<AuthCommand>,
    },
    /// Check for a newer release.
    Update,
}

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Interactive login: phone + verification code (or 2FA password).
    Login,
    /// Log out and delete the local session.
    Logout,
    /// Show current auth state.
    Status,
}

/// `YYYY-MM-DD` at UTC midnight.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, Error> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "invalid date {value:?}. Expected format: YYYY-MM-DD"
            ))
        })
}

pub fn parse_optional_date(value: Option<&str>) -> Result<Option<DateTime<Utc>>, Error> {
    value.map(parse_date).transpose()
}
