//! Constrained message retrieval: text, sender, time window, ordering, limit.
//!
//! Every query is turned into a [`FetchPlan`]: the part the transport is asked to do
//! (`request`) and the part checked locally on each message. Whenever a local check can
//! *skip* messages, the transport request carries no limit, otherwise a bounded page
//! could run out before `limit` survivors are found.

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use tracing::debug;

use crate::{
    domain::{name_of, Entity, Message, MessageRecord},
    errors::Error,
    ports::{MessageQuery, Transport},
    resolver::resolve_entity,
    Result,
};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const DEFAULT_READ_LIMIT: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchOptions {
    /// Restrict to one chat (scoped search); `None` searches all chats.
    pub chat: Option<String>,
    pub sender: Option<String>,
    pub limit: usize,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            chat: None,
            sender: None,
            limit: DEFAULT_SEARCH_LIMIT,
            after: None,
            before: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadOptions {
    pub limit: usize,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    /// Oldest first.
    pub reverse: bool,
    /// Case-insensitive substring, matched locally.
    pub query: Option<String>,
    pub sender: Option<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_READ_LIMIT,
            after: None,
            before: None,
            reverse: false,
            query: None,
            sender: None,
        }
    }
}

/// What happens to one message coming off the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Skip,
    Stop,
}

/// Transport request plus local filters for one retrieval pass.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchPlan {
    pub chat: Option<Entity>,
    pub request: MessageQuery,
    /// Lowercased needle matched against message text.
    pub text_filter: Option<String>,
    /// Sender matched by identity (global search only).
    pub sender_filter: Option<Entity>,
    pub limit: usize,
    pub after: Option<DateTime<Utc>>,
    /// Upper bound checked locally; only set when iterating oldest-first.
    pub before: Option<DateTime<Utc>>,
}

impl FetchPlan {
    fn new(chat: Option<Entity>, limit: usize) -> Self {
        Self {
            chat,
            request: MessageQuery::default(),
            text_filter: None,
            sender_filter: None,
            limit,
            after: None,
            before: None,
        }
    }

    /// Apply the time window. Newest-first pushes `before` to the server as the
    /// pagination offset; oldest-first checks it locally as a stop condition.
    fn window(mut self, after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>, reverse: bool) -> Self {
        self.after = after;
        self.request.reverse = reverse;
        if reverse {
            self.before = before;
        } else {
            self.request.offset_date = before;
        }
        self
    }

    /// Fix the transport limit once all local filters are known.
    fn finish(mut self) -> Self {
        let skips_locally = self.text_filter.is_some()
            || self.sender_filter.is_some()
            || (self.request.reverse && self.after.is_some());
        self.request.limit = if skips_locally { None } else { Some(self.limit) };
        self
    }

    pub fn check(&self, msg: &Message) -> Verdict {
        if let Some(after) = self.after {
            if msg.date < after {
                // Newest-first streams only get older from here on.
                return if self.request.reverse {
                    Verdict::Skip
                } else {
                    Verdict::Stop
                };
            }
        }
        if let Some(before) = self.before {
            if msg.date >= before {
                return Verdict::Stop;
            }
        }
        if let Some(needle) = &self.text_filter {
            if !msg.text.to_lowercase().contains(needle.as_str()) {
                return Verdict::Skip;
            }
        }
        if let Some(sender) = &self.sender_filter {
            match &msg.sender {
                Some(s) if s.same_peer(sender) => {}
                _ => return Verdict::Skip,
            }
        }
        Verdict::Accept
    }
}

fn needle(query: Option<&str>) -> Option<String> {
    query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase)
}

/// Search messages in one chat or across all chats.
///
/// Scoped search with both text and sender filters the sender on the server and the
/// text locally, because the platform's text search is unreliable when combined with
/// a sender constraint.
pub async fn search_messages<T>(
    transport: &T,
    query: &str,
    opts: &SearchOptions,
) -> Result<Vec<MessageRecord>>
where
    T: Transport + ?Sized,
{
    let chat = match opts.chat.as_deref() {
        Some(c) => Some(resolve_entity(transport, c).await?),
        None => None,
    };
    let sender = match opts.sender.as_deref() {
        Some(s) => Some(resolve_entity(transport, s).await?),
        None => None,
    };
    let text = needle(Some(query));

    let scoped = chat.is_some();
    let mut plan = FetchPlan::new(chat, opts.limit).window(opts.after, opts.before, false);
    match (scoped, sender) {
        (true, Some(sender)) => {
            plan.request.from_sender = Some(sender);
            plan.text_filter = text;
        }
        (true, None) => {
            plan.request.search = text;
        }
        (false, sender) => {
            let Some(text) = text else {
                return Err(Error::InvalidArgument(
                    "a search query is required when no chat is given".to_string(),
                ));
            };
            plan.request.search = Some(text);
            plan.sender_filter = sender;
        }
    }

    run_plan(transport, plan.finish()).await
}

/// Read a chat's history, newest first unless `opts.reverse`.
pub async fn read_messages<T>(transport: &T, chat: &str, opts: &ReadOptions) -> Result<Vec<MessageRecord>>
where
    T: Transport + ?Sized,
{
    let entity = resolve_entity(transport, chat).await?;
    let sender = match opts.sender.as_deref() {
        Some(s) => Some(resolve_entity(transport, s).await?),
        None => None,
    };

    let mut plan =
        FetchPlan::new(Some(entity), opts.limit).window(opts.after, opts.before, opts.reverse);
    plan.request.from_sender = sender;
    plan.text_filter = needle(opts.query.as_deref());

    run_plan(transport, plan.finish()).await
}

/// Drive the transport stream through the plan until `limit` records are accepted
/// or a stop condition is hit.
pub async fn run_plan<T>(transport: &T, plan: FetchPlan) -> Result<Vec<MessageRecord>>
where
    T: Transport + ?Sized,
{
    let mut out = Vec::new();
    if plan.limit == 0 {
        return Ok(out);
    }

    let chat_name = plan.chat.as_ref().map(Entity::display_name);
    debug!(
        chat = ?chat_name,
        request = ?plan.request,
        text_filter = ?plan.text_filter,
        "fetching messages"
    );

    let mut stream = transport.iter_messages(plan.chat.clone(), plan.request.clone());
    while let Some(msg) = stream.try_next().await? {
        match plan.check(&msg) {
            Verdict::Stop => break,
            Verdict::Skip => continue,
            Verdict::Accept => {}
        }
        let name = match &chat_name {
            Some(n) => n.clone(),
            None => name_of(msg.chat.as_ref()),
        };
        out.push(MessageRecord::from_message(&msg, &name));
        if out.len() >= plan.limit {
            break;
        }
    }

    Ok(out)
}
