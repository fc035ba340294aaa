use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::{
    domain::{Dialog, Entity, Message, MessageId},
    Result,
};

/// Parameters for one pass over a chat's (or the global) message stream.
///
/// `limit: None` means "until the history is exhausted"; callers that filter
/// client-side rely on that to avoid truncating before enough matches are seen.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageQuery {
    /// Server-side text search.
    pub search: Option<String>,
    /// Server-side sender filter.
    pub from_sender: Option<Entity>,
    pub limit: Option<usize>,
    /// Return messages strictly older than this date.
    pub offset_date: Option<DateTime<Utc>>,
    /// Oldest-first iteration.
    pub reverse: bool,
    /// Only ids strictly greater than this.
    pub min_id: Option<MessageId>,
    /// Only ids strictly lower than this.
    pub max_id: Option<MessageId>,
}

/// Hexagonal port for the platform client (read side).
///
/// Streams are lazy and paginate on demand; dropping one abandons the remaining pages.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Direct lookup of `@username`, `+phone`, or a numeric id.
    async fn resolve_reference(&self, reference: &str) -> Result<Entity>;

    /// The authenticated account itself.
    async fn get_self(&self) -> Result<Entity>;

    /// Every dialog visible to the account, in the transport's native order.
    fn iter_dialogs(&self) -> BoxStream<'_, Result<Dialog>>;

    /// Messages of `chat` (or of all chats when `None`, which requires `query.search`).
    fn iter_messages(&self, chat: Option<Entity>, query: MessageQuery)
        -> BoxStream<'_, Result<Message>>;

    /// A single message by id; `None` when it does not exist (deleted, invalid).
    async fn get_message_by_id(&self, chat: &Entity, id: MessageId) -> Result<Option<Message>>;
}

/// Outcome of submitting a login code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignIn {
    Done,
    PasswordRequired { hint: Option<String> },
}

/// Hexagonal port for account authentication.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn is_authorized(&self) -> Result<bool>;

    async fn request_code(&self, phone: &str) -> Result<()>;

    /// Submit the code from the last `request_code` call.
    async fn sign_in(&self, code: &str) -> Result<SignIn>;

    /// Complete a two-factor login after `SignIn::PasswordRequired`.
    async fn check_password(&self, password: &str) -> Result<()>;

    async fn me(&self) -> Result<Entity>;

    async fn log_out(&self) -> Result<()>;

    /// Serialize the current session into an opaque string for `SessionStore`.
    fn export_session(&self) -> Result<String>;
}

/// Storage for the opaque session string.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, session: &str) -> Result<()>;
    /// Idempotent: deleting a missing session is not an error.
    fn delete(&self) -> Result<()>;
}

/// Interactive input used by the login flow.
pub trait Prompter {
    fn prompt(&mut self, label: &str) -> Result<String>;

    /// Input that should not be echoed.
    fn prompt_secret(&mut self, label: &str) -> Result<String> {
        self.prompt(label)
    }
}
