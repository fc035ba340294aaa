//! `Transport` + `Authenticator` over grammers (MTProto user client).
//!
//! Chat handles carry access hashes that `Entity` does not, so every chat seen
//! on the way through is packed into a small cache keyed by id.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use grammers_client::{
    client::messages::{GlobalSearchIter, MessageIter, SearchIter},
    types::{self as gtypes, Chat, LoginToken, PackedChat, PasswordToken},
    Client, Config as ClientConfig, InitParams, InvocationError, SignInError,
};
use grammers_session::Session;
use grammers_tl_types as tl;
use tgcli_core::{
    config::Config,
    domain::{Dialog, Entity, Message, MessageId},
    ports::{Authenticator, MessageQuery, SignIn, Transport},
    Error, Result,
};
use tracing::debug;

pub struct MtprotoClient {
    client: Client,
    packed: Mutex<HashMap<i64, PackedChat>>,
    login_token: Mutex<Option<LoginToken>>,
    password_token: Mutex<Option<PasswordToken>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn map_invocation(e: InvocationError) -> Error {
    match &e {
        InvocationError::Rpc(rpc)
            if rpc.code == 401
                || matches!(
                    rpc.name.as_str(),
                    "AUTH_KEY_UNREGISTERED" | "SESSION_REVOKED" | "USER_DEACTIVATED"
                ) =>
        {
            Error::Unauthorized(rpc.name.clone())
        }
        _ => Error::Transport(e.to_string()),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl MtprotoClient {
    pub async fn connect(cfg: &Config, session: Option<&str>) -> Result<Self> {
        let session = match session {
            Some(hex_str) => {
                let bytes = hex::decode(hex_str)
                    .map_err(|e| Error::Config(format!("corrupt session file: {e}")))?;
                Session::load(&bytes)
                    .map_err(|e| Error::Config(format!("corrupt session file: {e}")))?
            }
            None => Session::new(),
        };

        let client = Client::connect(ClientConfig {
            session,
            api_id: cfg.api_id,
            api_hash: cfg.api_hash.clone(),
            params: InitParams {
                catch_up: false,
                ..Default::default()
            },
        })
        .await
        .map_err(|e| Error::Transport(format!("connect failed: {e}")))?;
        debug!("connected to Telegram");

        Ok(Self {
            client,
            packed: Mutex::new(HashMap::new()),
            login_token: Mutex::new(None),
            password_token: Mutex::new(None),
        })
    }

    /// Convert a grammers chat, remembering how to address it later.
    fn entity(&self, chat: &Chat) -> Entity {
        lock(&self.packed).insert(chat.id(), chat.pack());
        match chat {
            Chat::User(u) => Entity::User {
                id: u.id(),
                first_name: non_empty(u.first_name()),
                last_name: u.last_name().and_then(non_empty),
                username: u.username().map(str::to_string),
                phone: u.phone().map(str::to_string),
            },
            Chat::Group(g) => Entity::Group {
                id: g.id(),
                title: g.title().to_string(),
            },
            Chat::Channel(c) => Entity::Channel {
                id: c.id(),
                title: c.title().to_string(),
            },
        }
    }

    fn packed(&self, entity: &Entity) -> Result<PackedChat> {
        lock(&self.packed)
            .get(&entity.id())
            .cloned()
            .ok_or_else(|| Error::Transport(format!("no access hash cached for peer {}", entity.id())))
    }

    fn message(&self, m: &gtypes::Message) -> Message {
        Message {
            id: m.id(),
            text: m.text().to_string(),
            date: m.date(),
            reply_to_id: m.reply_to_message_id(),
            chat: Some(self.entity(&m.chat())),
            sender: m.sender().map(|s| self.entity(&s)),
        }
    }

    /// Linear scan over dialogs; used for peers without a username.
    async fn find_in_dialogs(&self, pred: impl Fn(&Chat) -> bool) -> Result<Option<Entity>> {
        let mut dialogs = self.client.iter_dialogs();
        while let Some(d) = dialogs.next().await.map_err(map_invocation)? {
            if pred(d.chat()) {
                return Ok(Some(self.entity(d.chat())));
            }
        }
        Ok(None)
    }

    fn dialog(&self, d: &gtypes::Dialog) -> Dialog {
        let (unread_count, pinned) = match &d.raw {
            tl::enums::Dialog::Dialog(raw) => (raw.unread_count.max(0) as u32, raw.pinned),
            tl::enums::Dialog::Folder(raw) => (0, raw.pinned),
        };
        let entity = self.entity(d.chat());
        Dialog {
            name: entity.display_name(),
            entity,
            unread_count,
            pinned,
            last_activity: d.last_message.as_ref().map(|m| m.date()),
        }
    }
}

/// The three server-side message sources grammers exposes.
enum Source {
    History(MessageIter),
    Search(SearchIter),
    Global(GlobalSearchIter),
}

impl Source {
    async fn next(&mut self) -> std::result::Result<Option<gtypes::Message>, InvocationError> {
        match self {
            Source::History(it) => it.next().await,
            Source::Search(it) => it.next().await,
            Source::Global(it) => it.next().await,
        }
    }
}

impl MtprotoClient {
    fn source(&self, chat: Option<&Entity>, query: &MessageQuery) -> Result<Source> {
        let offset_date = query.offset_date.and_then(unix_i32);
        let search = query.search.as_deref().filter(|s| !s.is_empty());
        Ok(match (chat, search) {
            (None, Some(text)) => Source::Global(self.client.search_all_messages().query(text)),
            (None, None) => {
                return Err(Error::InvalidArgument(
                    "global message iteration needs a search query".to_string(),
                ))
            }
            (Some(chat), Some(text)) => {
                let mut it = self.client.search_messages(self.packed(chat)?).query(text);
                if let Some(max_id) = query.max_id {
                    it = it.offset_id(max_id);
                }
                if let Some(date) = offset_date {
                    it = it.max_date(date);
                }
                Source::Search(it)
            }
            (Some(chat), None) => {
                let mut it = self.client.iter_messages(self.packed(chat)?);
                if let Some(max_id) = query.max_id {
                    it = it.offset_id(max_id);
                }
                if let Some(date) = offset_date {
                    it = it.max_date(date);
                }
                Source::History(it)
            }
        })
    }
}

fn fail<'a, T: Send + 'a>(e: Error) -> BoxStream<'a, Result<T>> {
    stream::once(async move { Err(e) }).boxed()
}

/// Unix seconds as the `i32` MTProto expects; `None` when out of range.
fn unix_i32(date: DateTime<Utc>) -> Option<i32> {
    i32::try_from(date.timestamp()).ok().filter(|t| *t > 0)
}

/// Numeric reference to a bare peer id. Accepts Bot API forms:
/// `-100<channel id>` and `-<group id>`.
fn peer_id_from_reference(reference: &str) -> Option<i64> {
    let raw: i64 = reference.parse().ok()?;
    if raw >= 0 {
        return Some(raw);
    }
    if let Some(channel) = reference
        .strip_prefix("-100")
        .and_then(|rest| rest.parse::<i64>().ok())
        .filter(|id| *id > 0)
    {
        return Some(channel);
    }
    raw.checked_abs()
}

const HISTORY_PAGE: i32 = 100;

/// Position of an oldest-first walk over `messages.getHistory`.
///
/// Each request asks for the page just above `after_id` (negative `add_offset`),
/// so pages arrive oldest-first without walking down from the newest message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ForwardCursor {
    after_id: i32,
    below_id: Option<i32>,
    done: bool,
}

impl ForwardCursor {
    fn new(min_id: Option<MessageId>, max_id: Option<MessageId>) -> Self {
        let after_id = min_id.unwrap_or(0).max(0);
        Self {
            after_id,
            below_id: max_id,
            done: max_id.is_some_and(|max| max <= after_id.saturating_add(1)),
        }
    }

    fn request(&self, peer: tl::enums::InputPeer) -> tl::functions::messages::GetHistory {
        tl::functions::messages::GetHistory {
            peer,
            offset_id: self.after_id.saturating_add(1),
            offset_date: 0,
            add_offset: -HISTORY_PAGE,
            limit: HISTORY_PAGE,
            max_id: self.below_id.unwrap_or(0),
            min_id: self.after_id,
            hash: 0,
        }
    }

    /// Move past a page given the raw ids it contained (service messages included).
    fn advance(&mut self, raw_ids: &[MessageId]) {
        match raw_ids.iter().copied().max() {
            Some(top) if top > self.after_id => {
                self.after_id = top;
                self.done = raw_ids.len() < HISTORY_PAGE as usize
                    || self
                        .below_id
                        .is_some_and(|max| max <= top.saturating_add(1));
            }
            _ => self.done = true,
        }
    }
}

/// Users and chats bundled with a raw history page.
struct RawPeers {
    users: HashMap<i64, Entity>,
    chats: HashMap<i64, Entity>,
}

impl RawPeers {
    fn new(users: Vec<tl::enums::User>, chats: Vec<tl::enums::Chat>) -> Self {
        let users = users
            .into_iter()
            .filter_map(|u| match u {
                tl::enums::User::User(u) => Some((
                    u.id,
                    Entity::User {
                        id: u.id,
                        first_name: u.first_name.as_deref().and_then(non_empty),
                        last_name: u.last_name.as_deref().and_then(non_empty),
                        username: u.username,
                        phone: u.phone,
                    },
                )),
                tl::enums::User::Empty(_) => None,
            })
            .collect();
        let chats = chats
            .into_iter()
            .filter_map(|c| {
                let (id, title, broadcast) = match c {
                    tl::enums::Chat::Chat(c) => (c.id, c.title, false),
                    tl::enums::Chat::Forbidden(c) => (c.id, c.title, false),
                    tl::enums::Chat::Channel(c) => (c.id, c.title, c.broadcast),
                    tl::enums::Chat::ChannelForbidden(c) => (c.id, c.title, c.broadcast),
                    tl::enums::Chat::Empty(_) => return None,
                };
                let entity = if broadcast {
                    Entity::Channel { id, title }
                } else {
                    Entity::Group { id, title }
                };
                Some((id, entity))
            })
            .collect();
        Self { users, chats }
    }

    fn peer(&self, peer: &tl::enums::Peer) -> Option<Entity> {
        match peer {
            tl::enums::Peer::User(p) => self.users.get(&p.user_id),
            tl::enums::Peer::Chat(p) => self.chats.get(&p.chat_id),
            tl::enums::Peer::Channel(p) => self.chats.get(&p.channel_id),
        }
        .cloned()
    }

    /// Plain messages only; service and empty entries yield `None`.
    fn message(&self, raw: tl::enums::Message, chat: &Entity, me: Option<&Entity>) -> Option<Message> {
        let tl::enums::Message::Message(m) = raw else {
            return None;
        };
        let sender = match &m.from_id {
            Some(p) => self.peer(p),
            None if m.out => me.cloned(),
            None => self.peer(&m.peer_id),
        };
        let reply_to_id = match &m.reply_to {
            Some(tl::enums::MessageReplyHeader::Header(h)) => h.reply_to_msg_id,
            _ => None,
        };
        Some(Message {
            id: m.id,
            text: m.message,
            date: Utc.timestamp_opt(i64::from(m.date), 0).single()?,
            reply_to_id,
            chat: Some(chat.clone()),
            sender,
        })
    }
}

fn raw_message_id(raw: &tl::enums::Message) -> MessageId {
    match raw {
        tl::enums::Message::Message(m) => m.id,
        tl::enums::Message::Service(m) => m.id,
        tl::enums::Message::Empty(m) => m.id,
    }
}

impl MtprotoClient {
    /// One ascending page after `cursor`, plus every raw id seen on it.
    async fn history_page(
        &self,
        chat: &Entity,
        peer: tl::enums::InputPeer,
        cursor: &ForwardCursor,
        me: Option<&Entity>,
    ) -> Result<(Vec<Message>, Vec<MessageId>)> {
        use tl::enums::messages::Messages;

        let (raw, users, chats) = match self
            .client
            .invoke(&cursor.request(peer))
            .await
            .map_err(map_invocation)?
        {
            Messages::Messages(m) => (m.messages, m.users, m.chats),
            Messages::Slice(m) => (m.messages, m.users, m.chats),
            Messages::ChannelMessages(m) => (m.messages, m.users, m.chats),
            Messages::NotModified(_) => return Ok((Vec::new(), Vec::new())),
        };

        let ids: Vec<MessageId> = raw.iter().map(raw_message_id).collect();
        let peers = RawPeers::new(users, chats);
        // The server orders each page newest-first.
        let mut page: Vec<Message> = raw
            .into_iter()
            .rev()
            .filter_map(|m| peers.message(m, chat, me))
            .collect();
        page.sort_by_key(|m| m.id);
        Ok((page, ids))
    }

    /// Oldest-first iteration, paging upwards from `min_id` one request at a time.
    fn forward_history(&self, chat: Entity, query: MessageQuery) -> BoxStream<'_, Result<Message>> {
        if query.search.is_some() {
            return fail(Error::InvalidArgument(
                "oldest-first iteration does not support server-side search".to_string(),
            ));
        }
        let peer = match self.packed(&chat) {
            Ok(p) => p.to_input_peer(),
            Err(e) => return fail(e),
        };

        let start = ForwardCursor::new(query.min_id, query.max_id);
        let pages = stream::try_unfold((start, None), move |(mut cursor, me)| {
            let chat = chat.clone();
            let peer = peer.clone();
            async move {
                if cursor.done {
                    return Ok::<_, Error>(None);
                }
                // Outgoing private messages carry no sender; they are ours.
                let me: Option<Entity> = match me {
                    Some(me) => me,
                    None => self.get_self().await.ok(),
                };
                let (page, ids) = self.history_page(&chat, peer, &cursor, me.as_ref()).await?;
                debug!(after = cursor.after_id, got = ids.len(), "history page");
                cursor.advance(&ids);
                Ok(Some((page, (cursor, Some(me)))))
            }
        });

        let max_id = query.max_id;
        let sender = query.from_sender;
        pages
            .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, Error>)))
            .try_flatten()
            .try_take_while(move |m| {
                let keep = max_id.map_or(true, |max| m.id < max);
                async move { Ok(keep) }
            })
            .try_filter(move |m| {
                let keep = sender.as_ref().map_or(true, |s| {
                    m.sender.as_ref().is_some_and(|from| from.same_peer(s))
                });
                async move { keep }
            })
            .take(query.limit.unwrap_or(usize::MAX))
            .boxed()
    }
}

#[async_trait]
impl Transport for MtprotoClient {
    async fn resolve_reference(&self, reference: &str) -> Result<Entity> {
        let reference = reference.trim();
        if let Some(username) = reference.strip_prefix('@') {
            let chat = self
                .client
                .resolve_username(username)
                .await
                .map_err(map_invocation)?;
            return chat
                .map(|c| self.entity(&c))
                .ok_or_else(|| Error::not_found(reference));
        }

        if let Some(digits) = reference.strip_prefix('+') {
            let digits: String = digits.chars().filter(char::is_ascii_digit).collect();
            return self
                .find_in_dialogs(|c| matches!(c, Chat::User(u) if u.phone() == Some(digits.as_str())))
                .await?
                .ok_or_else(|| Error::not_found(reference));
        }

        let id = peer_id_from_reference(reference).ok_or_else(|| Error::not_found(reference))?;
        self.find_in_dialogs(|c| c.id() == id)
            .await?
            .ok_or_else(|| Error::not_found(reference))
    }

    async fn get_self(&self) -> Result<Entity> {
        let me = self.client.get_me().await.map_err(map_invocation)?;
        Ok(self.entity(&Chat::User(me)))
    }

    fn iter_dialogs(&self) -> BoxStream<'_, Result<Dialog>> {
        let dialogs = self.client.iter_dialogs();
        stream::try_unfold(dialogs, move |mut it| async move {
            let next = it.next().await.map_err(map_invocation)?;
            Ok::<_, Error>(next.map(|d| (self.dialog(&d), it)))
        })
        .boxed()
    }

    fn iter_messages(
        &self,
        chat: Option<Entity>,
        query: MessageQuery,
    ) -> BoxStream<'_, Result<Message>> {
        if query.reverse {
            return match chat {
                Some(chat) => self.forward_history(chat, query),
                None => fail(Error::InvalidArgument(
                    "oldest-first iteration needs a chat".to_string(),
                )),
            };
        }

        let source = match self.source(chat.as_ref(), &query) {
            Ok(s) => s,
            Err(e) => return fail(e),
        };

        let raw = stream::try_unfold(source, move |mut src| async move {
            let next = src.next().await.map_err(map_invocation)?;
            Ok::<_, Error>(next.map(|m| (self.message(&m), src)))
        });

        // Newest-first walk; everything below narrows it.
        let min_id = query.min_id;
        let max_id = query.max_id;
        let before = query.offset_date;
        let sender = query.from_sender.clone();
        let narrowed = raw
            .try_take_while(move |m| {
                let keep = min_id.map_or(true, |min| m.id > min);
                async move { Ok(keep) }
            })
            .try_filter(move |m| {
                let keep = max_id.map_or(true, |max| m.id < max)
                    && before.map_or(true, |b| m.date < b)
                    && sender.as_ref().map_or(true, |s| {
                        m.sender.as_ref().is_some_and(|from| from.same_peer(s))
                    });
                async move { keep }
            });

        narrowed.take(query.limit.unwrap_or(usize::MAX)).boxed()
    }

    async fn get_message_by_id(&self, chat: &Entity, id: MessageId) -> Result<Option<Message>> {
        let packed = self.packed(chat)?;
        let found = self
            .client
            .get_messages_by_id(packed, &[id])
            .await
            .map_err(map_invocation)?;
        Ok(found.into_iter().flatten().next().map(|m| self.message(&m)))
    }
}

#[async_trait]
impl Authenticator for MtprotoClient {
    async fn is_authorized(&self) -> Result<bool> {
        self.client.is_authorized().await.map_err(map_invocation)
    }

    async fn request_code(&self, phone: &str) -> Result<()> {
        let token = self
            .client
            .request_login_code(phone)
            .await
            .map_err(|e| Error::Transport(format!("login code request failed: {e}")))?;
        *lock(&self.login_token) = Some(token);
        Ok(())
    }

    async fn sign_in(&self, code: &str) -> Result<SignIn> {
        let token = lock(&self.login_token)
            .take()
            .ok_or_else(|| Error::InvalidArgument("no login code was requested".to_string()))?;
        match self.client.sign_in(&token, code).await {
            Ok(_) => Ok(SignIn::Done),
            Err(SignInError::PasswordRequired(pt)) => {
                let hint = pt.hint().map(str::to_string);
                *lock(&self.password_token) = Some(pt);
                Ok(SignIn::PasswordRequired { hint })
            }
            Err(SignInError::InvalidCode) => {
                Err(Error::InvalidArgument("invalid verification code".to_string()))
            }
            Err(SignInError::SignUpRequired { .. }) => Err(Error::Unauthorized(
                "no Telegram account exists for this phone number".to_string(),
            )),
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }

    async fn check_password(&self, password: &str) -> Result<()> {
        let token = lock(&self.password_token)
            .take()
            .ok_or_else(|| Error::InvalidArgument("no password was requested".to_string()))?;
        match self.client.check_password(token, password.as_bytes()).await {
            Ok(_) => Ok(()),
            Err(SignInError::InvalidPassword) => {
                Err(Error::InvalidArgument("invalid 2FA password".to_string()))
            }
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }

    async fn me(&self) -> Result<Entity> {
        self.get_self().await
    }

    async fn log_out(&self) -> Result<()> {
        self.client
            .invoke(&tl::functions::auth::LogOut {})
            .await
            .map_err(map_invocation)?;
        Ok(())
    }

    fn export_session(&self) -> Result<String> {
        Ok(hex::encode(self.client.session().save()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_pages_upwards_from_min_id() {
        let mut c = ForwardCursor::new(Some(100), None);
        assert!(!c.done);
        assert_eq!(c.after_id, 100);

        let full: Vec<MessageId> = (101..=200).rev().collect();
        c.advance(&full);
        assert_eq!(c.after_id, 200);
        assert!(!c.done);

        // A short page is the top of the chat.
        c.advance(&[203, 201]);
        assert_eq!(c.after_id, 203);
        assert!(c.done);
    }

    #[test]
    fn cursor_stops_on_empty_page_and_at_max_id() {
        let mut c = ForwardCursor::new(None, None);
        assert_eq!(c.after_id, 0);
        c.advance(&[]);
        assert!(c.done);

        let mut c = ForwardCursor::new(Some(10), Some(112));
        let full: Vec<MessageId> = (11..=110).collect();
        c.advance(&full);
        assert!(!c.done);
        c.advance(&(12..=111).collect::<Vec<_>>());
        assert!(c.done);

        // Nothing can sit strictly between 10 and 11.
        assert!(ForwardCursor::new(Some(10), Some(11)).done);
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let mut c = ForwardCursor::new(Some(50), None);
        c.advance(&[40, 45]);
        assert!(c.done);
        assert_eq!(c.after_id, 50);
    }

    #[test]
    fn dates_outside_i32_are_not_sent() {
        let y2100 = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(unix_i32(y2100), None);
        let y2025 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(unix_i32(y2025), Some(1_735_689_600));
    }

    #[test]
    fn numeric_references() {
        assert_eq!(peer_id_from_reference("12345"), Some(12345));
        assert_eq!(peer_id_from_reference("-1001234567"), Some(1234567));
        assert_eq!(peer_id_from_reference("-4567"), Some(4567));
        assert_eq!(peer_id_from_reference("-9223372036854775808"), None);
        assert_eq!(peer_id_from_reference("abc"), None);
    }
}
