//! Scripted in-memory transport shared by the engine tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::{stream::BoxStream, StreamExt};

use crate::{
    domain::{Dialog, Entity, Message, MessageId},
    errors::Error,
    ports::{MessageQuery, Transport},
    Result,
};

type Responder = Box<dyn Fn(&MessageQuery) -> Vec<Message> + Send + Sync>;

#[derive(Default)]
pub struct FakeTransport {
    pub me: Option<Entity>,
    pub dialogs: Vec<Dialog>,
    pub direct: HashMap<String, Entity>,
    pub by_id: HashMap<MessageId, Message>,
    pub unauthorized: bool,
    pub responder: Option<Responder>,
    /// `(n, msg)`: the dialog stream yields `n` items, then `Error::Transport(msg)`.
    pub dialog_failure: Option<(usize, String)>,
    /// Same for every `iter_messages` stream.
    pub message_failure: Option<(usize, String)>,

    pub queries: Mutex<Vec<(Option<Entity>, MessageQuery)>>,
    pub direct_calls: Mutex<Vec<String>>,
    pub dialog_scans: AtomicUsize,
    pub dialogs_pulled: Arc<AtomicUsize>,
    pub messages_pulled: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub fn with_dialogs(names: &[&str]) -> Self {
        Self {
            dialogs: names
                .iter()
                .enumerate()
                .map(|(i, n)| dialog(n, group(100 + i as i64, n)))
                .collect(),
            ..Default::default()
        }
    }

    /// Every `iter_messages` call is answered by `f`; the limit is applied on top,
    /// like a real server would.
    pub fn respond(mut self, f: impl Fn(&MessageQuery) -> Vec<Message> + Send + Sync + 'static) -> Self {
        self.responder = Some(Box::new(f));
        self
    }

    pub fn recorded(&self) -> Vec<(Option<Entity>, MessageQuery)> {
        self.queries.lock().unwrap().clone()
    }

    pub fn last_query(&self) -> MessageQuery {
        self.recorded().last().expect("no iter_messages call").1.clone()
    }

    fn guard(&self) -> Result<()> {
        if self.unauthorized {
            return Err(Error::Unauthorized("AUTH_KEY_UNREGISTERED".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn resolve_reference(&self, reference: &str) -> Result<Entity> {
        self.guard()?;
        self.direct_calls.lock().unwrap().push(reference.to_string());
        self.direct
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::Transport("USERNAME_NOT_OCCUPIED".to_string()))
    }

    async fn get_self(&self) -> Result<Entity> {
        self.guard()?;
        self.me
            .clone()
            .ok_or_else(|| Error::Transport("no self entity".to_string()))
    }

    fn iter_dialogs(&self) -> BoxStream<'_, Result<Dialog>> {
        if let Err(e) = self.guard() {
            return futures::stream::once(async move { Err(e) }).boxed();
        }
        self.dialog_scans.fetch_add(1, Ordering::SeqCst);
        let pulled = Arc::clone(&self.dialogs_pulled);
        futures::stream::iter(scripted(self.dialogs.clone(), self.dialog_failure.as_ref()))
            .inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }

    fn iter_messages(
        &self,
        chat: Option<Entity>,
        query: MessageQuery,
    ) -> BoxStream<'_, Result<Message>> {
        if let Err(e) = self.guard() {
            return futures::stream::once(async move { Err(e) }).boxed();
        }
        let items = self
            .responder
            .as_ref()
            .map(|f| f(&query))
            .unwrap_or_default();
        let limit = query.limit.unwrap_or(usize::MAX);
        self.queries.lock().unwrap().push((chat, query));
        let pulled = Arc::clone(&self.messages_pulled);
        futures::stream::iter(scripted(items, self.message_failure.as_ref()))
            .take(limit)
            .inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }

    async fn get_message_by_id(&self, _chat: &Entity, id: MessageId) -> Result<Option<Message>> {
        self.guard()?;
        Ok(self.by_id.get(&id).cloned())
    }
}

/// Items as `Ok`, cut short by an injected transport failure when one is set.
fn scripted<T>(items: Vec<T>, failure: Option<&(usize, String)>) -> Vec<Result<T>> {
    match failure {
        None => items.into_iter().map(Ok).collect(),
        Some((n, msg)) => items
            .into_iter()
            .take(*n)
            .map(Ok)
            .chain(std::iter::once(Err(Error::Transport(msg.clone()))))
            .collect(),
    }
}

pub fn group(id: i64, title: &str) -> Entity {
    Entity::Group {
        id,
        title: title.to_string(),
    }
}

pub fn user(id: i64, first_name: &str) -> Entity {
    Entity::User {
        id,
        first_name: Some(first_name.to_string()),
        last_name: None,
        username: None,
        phone: None,
    }
}

pub fn dialog(name: &str, entity: Entity) -> Dialog {
    Dialog {
        name: name.to_string(),
        entity,
        unread_count: 0,
        pinned: false,
        last_activity: None,
    }
}

pub fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn msg(id: MessageId, text: &str) -> Message {
    msg_at(id, text, Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap())
}

pub fn msg_at(id: MessageId, text: &str, date: DateTime<Utc>) -> Message {
    Message {
        id,
        text: text.to_string(),
        date,
        reply_to_id: None,
        chat: None,
        sender: Some(user(1, "Alice")),
    }
}
